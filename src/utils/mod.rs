use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Generate a random unique ID for files and transfers
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current Unix timestamp in milliseconds
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

/// Format a file size in human-readable form
pub fn format_size(size: u64) -> String {
    let units = ["B", "KB", "MB", "GB", "TB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < units.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", size as u64, units[unit_index])
    } else {
        format!("{:.2} {}", size, units[unit_index])
    }
}

/// Get the filename from a path
pub fn get_filename(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|os_str| os_str.to_str())
        .map(String::from)
}

/// Rounded percentage of `done` over `total`, capped at 100
///
/// An empty total counts as complete.
pub fn percent_of(done: u64, total: u64) -> u32 {
    if total == 0 {
        return 100;
    }
    let pct = (done as f64 / total as f64 * 100.0).round();
    pct.min(100.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1024), "1.00 KB");
        assert_eq!(format_size(1024 * 1024), "1.00 MB");
        assert_eq!(format_size(1024 * 1024 * 1024), "1.00 GB");
    }

    #[test]
    fn test_generate_id() {
        let id1 = generate_id();
        let id2 = generate_id();
        assert_ne!(id1, id2);
        assert_eq!(id1.len(), 36); // UUID length
    }

    #[test]
    fn test_percent_of() {
        assert_eq!(percent_of(0, 10_000), 0);
        assert_eq!(percent_of(994, 1000), 99);
        assert_eq!(percent_of(997, 1000), 100);
        assert_eq!(percent_of(5000, 10_000), 50);
        assert_eq!(percent_of(20, 10), 100);
        assert_eq!(percent_of(0, 0), 100);
    }

    #[test]
    fn test_get_filename() {
        assert_eq!(
            get_filename(Path::new("/tmp/a/report.pdf")),
            Some("report.pdf".to_string())
        );
        assert_eq!(get_filename(Path::new("/")), None);
    }
}
