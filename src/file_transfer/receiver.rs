//! Inbound side of the transfer channel.
//!
//! One call handles one connection: header, quota decision, then the raw
//! byte stream straight to disk until the sender closes its write half.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use super::quota::QuotaGuard;
use crate::core::{
    BlockReason, EventPublisher, FileHeader, PeerEvent, QuotaDecision, ReceiveProgress,
    ReceivedFile, TransportError,
};
use crate::protocol::{self, read_header};
use crate::utils::percent_of;

/// Progress events are emitted every this many percentage points
const PROGRESS_STEP: u32 = 10;

/// Everything a transfer connection needs from the facade
#[derive(Clone)]
pub struct ReceiveContext {
    pub quota: QuotaGuard,
    pub publisher: Arc<dyn EventPublisher>,
    pub max_header_len: usize,
    pub chunk_size: usize,
    pub idle_timeout: Option<Duration>,
}

/// How a single inbound transfer ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    Received(PathBuf),
    Blocked(BlockReason),
    Incomplete { received: u64, expected: u64 },
    /// No sync folder configured, nothing was written
    NoDestination,
}

/// Run the receive algorithm on one accepted connection
pub async fn handle_transfer_connection<S>(
    mut stream: S,
    ctx: &ReceiveContext,
) -> Result<ReceiveOutcome, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let header = read_header(&mut stream, ctx.max_header_len).await?;
    info!(
        file = %header.name,
        size = header.size,
        from = %header.from.name,
        "Incoming file"
    );

    let quota = ctx.quota.clone();
    let size = header.size;
    let decision = tokio::task::spawn_blocking(move || quota.check(size))
        .await
        .map_err(|e| TransportError::Io(e.to_string()))?;

    if let QuotaDecision::Rejected(reason) = decision {
        warn!(file = %header.name, size = header.size, %reason, "Blocked incoming file");
        let from = header.from.clone();
        ctx.publisher.publish(PeerEvent::FileBlocked {
            file: header,
            from,
            reason,
        });
        let _ = stream.shutdown().await;
        return Ok(ReceiveOutcome::Blocked(reason));
    }

    let Some(sync_folder) = ctx.quota.sync_folder() else {
        warn!(file = %header.name, "No sync folder configured, dropping transfer");
        let _ = stream.shutdown().await;
        return Ok(ReceiveOutcome::NoDestination);
    };

    let local_path = resolve_destination(&sync_folder, &header)?;
    if let Some(parent) = local_path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut file = fs::File::create(&local_path).await?;

    let mut reporter = ProgressReporter::new(&header, &local_path, ctx.publisher.as_ref());
    reporter.report(0);

    let mut buffer = vec![0u8; ctx.chunk_size.max(1)];
    let mut received: u64 = 0;
    let streamed: Result<(), TransportError> = loop {
        let n = match read_chunk(&mut stream, &mut buffer, ctx.idle_timeout).await {
            Ok(0) => break Ok(()),
            Ok(n) => n,
            Err(e) => break Err(e),
        };
        if let Err(e) = file.write_all(&buffer[..n]).await {
            break Err(e.into());
        }
        received += n as u64;
        reporter.report(received);
    };

    let flushed = file.flush().await;
    drop(file);

    let failure = match (streamed, flushed) {
        (Err(e), _) => Some(e),
        (Ok(()), Err(e)) => Some(e.into()),
        (Ok(()), Ok(())) => None,
    };

    if failure.is_none() && protocol::is_complete(received, header.size) {
        info!(
            file = %header.name,
            bytes = received,
            path = %local_path.display(),
            "File received"
        );
        let from = header.from.clone();
        ctx.publisher.publish(PeerEvent::FileReceived {
            file: ReceivedFile {
                header,
                path: local_path.clone(),
            },
            from,
        });
        return Ok(ReceiveOutcome::Received(local_path));
    }

    match failure {
        Some(e) => warn!(file = %header.name, bytes = received, error = %e, "Transfer interrupted"),
        None => warn!(
            file = %header.name,
            received,
            expected = header.size,
            "Incomplete transfer"
        ),
    }
    if let Err(e) = fs::remove_file(&local_path).await {
        warn!(path = %local_path.display(), error = %e, "Failed to remove partial file");
    }
    Ok(ReceiveOutcome::Incomplete {
        received,
        expected: header.size,
    })
}

/// Where a header's file lands under `sync_folder`
///
/// Only plain relative components are accepted; anything that could leave
/// the sync folder is an invalid header.
pub fn resolve_destination(sync_folder: &Path, header: &FileHeader) -> Result<PathBuf, TransportError> {
    let requested = header.destination();
    let mut path = sync_folder.to_path_buf();
    let mut depth = 0;

    for component in Path::new(requested).components() {
        match component {
            Component::Normal(part) => {
                path.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(TransportError::InvalidHeader(format!(
                    "path outside sync folder: {}",
                    requested
                )));
            }
        }
    }

    if depth == 0 {
        return Err(TransportError::InvalidHeader("empty file name".to_string()));
    }
    Ok(path)
}

async fn read_chunk<S>(
    stream: &mut S,
    buffer: &mut [u8],
    idle_timeout: Option<Duration>,
) -> Result<usize, TransportError>
where
    S: AsyncRead + Unpin,
{
    match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, stream.read(buffer))
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(TransportError::from),
        None => Ok(stream.read(buffer).await?),
    }
}

/// Emits `file-progress` in 10-point steps plus once on reaching the announced size
struct ProgressReporter<'a> {
    header: &'a FileHeader,
    local_path: &'a Path,
    publisher: &'a dyn EventPublisher,
    last_reported: Option<u32>,
    reached_size: bool,
}

impl<'a> ProgressReporter<'a> {
    fn new(header: &'a FileHeader, local_path: &'a Path, publisher: &'a dyn EventPublisher) -> Self {
        Self {
            header,
            local_path,
            publisher,
            last_reported: None,
            reached_size: false,
        }
    }

    fn report(&mut self, received: u64) {
        let progress = percent_of(received, self.header.size);
        let at_size = received >= self.header.size;

        let step_due = match self.last_reported {
            None => true,
            Some(last) => progress >= last + PROGRESS_STEP,
        };
        let final_due = at_size && !self.reached_size;
        if !step_due && !final_due {
            return;
        }

        self.last_reported = Some(progress);
        self.reached_size |= at_size;
        debug!(file = %self.header.name, received, progress, "Receive progress");

        self.publisher.publish(PeerEvent::FileProgress(ReceiveProgress {
            file_id: self.header.id.clone(),
            file_name: self.header.name.clone(),
            file_type: self.header.file_type.clone(),
            bytes_received: received,
            total_bytes: self.header.size,
            progress,
            relative_path: self.header.relative_path.clone(),
            local_path: self.local_path.to_path_buf(),
            from: self.header.from.clone(),
            direction: "receiving",
        }));
    }
}
