//! Storage quota enforcement for incoming files.
//!
//! The aggregate check re-walks the sync folder on every decision. Nothing is
//! reserved for transfers that were accepted but are still streaming, so
//! concurrent transfers can together overshoot `max_storage_bytes`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;
use walkdir::WalkDir;

use crate::core::{BlockReason, QuotaDecision};

/// Destination and limits pushed in by the settings layer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoragePolicy {
    pub sync_folder: Option<PathBuf>,
    /// Aggregate size allowed under the sync folder, `None` = unlimited
    pub max_storage_bytes: Option<u64>,
    /// Largest single file accepted, `None` = unlimited
    pub max_file_bytes: Option<u64>,
}

/// Decides whether an incoming file may be accepted
///
/// Clones share the same policy, so setters take effect for every holder.
#[derive(Debug, Clone, Default)]
pub struct QuotaGuard {
    policy: Arc<RwLock<StoragePolicy>>,
}

impl QuotaGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: StoragePolicy) -> Self {
        let guard = Self::new();
        guard.set_sync_folder(policy.sync_folder);
        guard.set_storage_limits(policy.max_storage_bytes, policy.max_file_bytes);
        guard
    }

    pub fn set_sync_folder(&self, folder: Option<PathBuf>) {
        self.write().sync_folder = folder;
    }

    /// A limit of zero means unlimited, same as `None`
    pub fn set_storage_limits(&self, max_storage_bytes: Option<u64>, max_file_bytes: Option<u64>) {
        let mut policy = self.write();
        policy.max_storage_bytes = max_storage_bytes.filter(|&limit| limit > 0);
        policy.max_file_bytes = max_file_bytes.filter(|&limit| limit > 0);
    }

    pub fn policy(&self) -> StoragePolicy {
        self.policy
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn sync_folder(&self) -> Option<PathBuf> {
        self.policy().sync_folder
    }

    /// Decide for a file of `size` bytes. Walks the sync folder, call off the async runtime.
    pub fn check(&self, size: u64) -> QuotaDecision {
        let policy = self.policy();

        if let Some(max_file) = policy.max_file_bytes {
            if size > max_file {
                return QuotaDecision::Rejected(BlockReason::FileTooLarge);
            }
        }

        if let (Some(max_storage), Some(folder)) = (policy.max_storage_bytes, &policy.sync_folder) {
            let current = folder_size(folder);
            debug!(folder = %folder.display(), current, incoming = size, max_storage, "storage check");
            if current.saturating_add(size) > max_storage {
                return QuotaDecision::Rejected(BlockReason::StorageFull);
            }
        }

        QuotaDecision::Allowed
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, StoragePolicy> {
        self.policy.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Total size of all files below `path`; unreadable entries are skipped
pub fn folder_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|metadata| metadata.len())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fill(dir: &Path, name: &str, len: usize) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, vec![7u8; len]).unwrap();
    }

    #[test]
    fn test_folder_size_is_recursive() {
        let dir = tempfile::tempdir().unwrap();
        fill(dir.path(), "a.bin", 100);
        fill(dir.path(), "nested/b.bin", 250);
        fill(dir.path(), "nested/deeper/c.bin", 50);

        assert_eq!(folder_size(dir.path()), 400);
    }

    #[test]
    fn test_folder_size_missing_folder() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(folder_size(&dir.path().join("nope")), 0);
    }

    #[test]
    fn test_no_limits_allows_everything() {
        let guard = QuotaGuard::new();
        assert_eq!(guard.check(u64::MAX), QuotaDecision::Allowed);
    }

    #[test]
    fn test_file_too_large() {
        let guard = QuotaGuard::new();
        guard.set_storage_limits(None, Some(1000));

        assert_eq!(guard.check(1000), QuotaDecision::Allowed);
        assert_eq!(
            guard.check(1001),
            QuotaDecision::Rejected(BlockReason::FileTooLarge)
        );
    }

    #[test]
    fn test_file_limit_checked_before_storage() {
        let dir = tempfile::tempdir().unwrap();
        fill(dir.path(), "a.bin", 900);

        let guard = QuotaGuard::with_policy(StoragePolicy {
            sync_folder: Some(dir.path().to_path_buf()),
            max_storage_bytes: Some(1000),
            max_file_bytes: Some(500),
        });
        assert_eq!(
            guard.check(600),
            QuotaDecision::Rejected(BlockReason::FileTooLarge)
        );
    }

    #[test]
    fn test_storage_full_uses_current_folder_size() {
        let dir = tempfile::tempdir().unwrap();
        fill(dir.path(), "a.bin", 700);

        let guard = QuotaGuard::new();
        guard.set_sync_folder(Some(dir.path().to_path_buf()));
        guard.set_storage_limits(Some(1000), None);

        assert_eq!(guard.check(300), QuotaDecision::Allowed);
        assert_eq!(
            guard.check(301),
            QuotaDecision::Rejected(BlockReason::StorageFull)
        );

        fill(dir.path(), "b.bin", 200);
        assert_eq!(
            guard.check(101),
            QuotaDecision::Rejected(BlockReason::StorageFull)
        );
    }

    #[test]
    fn test_storage_limit_ignored_without_folder() {
        let guard = QuotaGuard::new();
        guard.set_storage_limits(Some(10), None);
        assert_eq!(guard.check(1_000_000), QuotaDecision::Allowed);
    }

    #[test]
    fn test_zero_limits_mean_unlimited() {
        let guard = QuotaGuard::new();
        guard.set_storage_limits(Some(0), Some(0));
        assert_eq!(guard.policy().max_file_bytes, None);
        assert_eq!(guard.policy().max_storage_bytes, None);
        assert!(guard.check(5).is_allowed());
    }

    #[test]
    fn test_clones_share_policy() {
        let guard = QuotaGuard::new();
        let other = guard.clone();
        guard.set_storage_limits(None, Some(1));
        assert_eq!(
            other.check(2),
            QuotaDecision::Rejected(BlockReason::FileTooLarge)
        );
    }
}
