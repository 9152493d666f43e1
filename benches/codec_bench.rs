use criterion::{Criterion, black_box, criterion_group, criterion_main};
use polyhub::core::{FileHeader, ProfileSnapshot};
use polyhub::protocol::{ControlDecoder, ControlMessage, encode_header, read_header};

fn sample_header() -> FileHeader {
    FileHeader {
        id: "bench".to_string(),
        name: "report.pdf".to_string(),
        size: 10_000,
        file_type: Some("application/pdf".to_string()),
        shared_by: Some("Alice".to_string()),
        shared_at: Some(1_700_000_000_000),
        from: ProfileSnapshot::new("Alice", "100.1.1.1"),
        relative_path: Some("projectX/report.pdf".to_string()),
        folder_name: Some("projectX".to_string()),
    }
}

fn bench_header_roundtrip(c: &mut Criterion) {
    let header = sample_header();

    c.bench_function("header_roundtrip", |b| {
        b.iter(|| {
            let frame = encode_header(&header).unwrap();
            futures::executor::block_on(async {
                let mut reader = &frame[..];
                let decoded = read_header(&mut reader, 1024 * 1024).await.unwrap();
                black_box(decoded)
            })
        })
    });
}

fn bench_control_decoder(c: &mut Criterion) {
    // a profile update with a 64KB inline picture, delivered in 1KB chunks
    let mut profile = ProfileSnapshot::new("Alice", "100.1.1.1");
    profile.profile_picture = Some(format!("data:image/png;base64,{}", "A".repeat(64 * 1024)));
    let wire = ControlMessage::ProfileUpdate { profile }.encode().unwrap();

    c.bench_function("control_decoder_chunked_64KB", |b| {
        b.iter(|| {
            let mut decoder = ControlDecoder::new(16 * 1024 * 1024);
            let mut decoded = Vec::new();
            for chunk in wire.chunks(1024) {
                decoded.extend(decoder.push(chunk).unwrap());
            }
            black_box(decoded)
        })
    });
}

criterion_group!(benches, bench_header_roundtrip, bench_control_decoder);
criterion_main!(benches);
