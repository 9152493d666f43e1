use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::protocol::{CONTROL_PORT, TRANSFER_PORT};

/// A reachable peer on the overlay network
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerAddress {
    pub host: String,
    pub control_port: u16,
    pub transfer_port: u16,
}

impl PeerAddress {
    /// Address a peer on the well-known ports
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            control_port: CONTROL_PORT,
            transfer_port: TRANSFER_PORT,
        }
    }

    pub fn with_ports(host: impl Into<String>, control_port: u16, transfer_port: u16) -> Self {
        Self {
            host: host.into(),
            control_port,
            transfer_port,
        }
    }

    pub fn control_target(&self) -> (&str, u16) {
        (self.host.as_str(), self.control_port)
    }

    pub fn transfer_target(&self) -> (&str, u16) {
        (self.host.as_str(), self.transfer_port)
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.host)
    }
}

/// Value copy of a peer's identity taken when a message is sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSnapshot {
    pub name: String,
    pub ip: String,
    #[serde(default)]
    pub profile_picture: Option<String>,
}

impl ProfileSnapshot {
    pub fn new(name: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ip: ip.into(),
            profile_picture: None,
        }
    }
}

/// Describes the byte stream that follows it on a transfer connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileHeader {
    pub id: String,
    pub name: String,
    pub size: u64,
    #[serde(rename = "type", default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub shared_by: Option<String>,
    /// Milliseconds since the Unix epoch
    #[serde(default)]
    pub shared_at: Option<u64>,
    pub from: ProfileSnapshot,
    #[serde(default)]
    pub relative_path: Option<String>,
    #[serde(default)]
    pub folder_name: Option<String>,
}

impl FileHeader {
    /// Path relative to the sync folder where this file lands
    pub fn destination(&self) -> &str {
        match self.relative_path.as_deref() {
            Some(rel) if !rel.is_empty() => rel,
            _ => &self.name,
        }
    }
}

/// A local file the application wants to push to a peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedFile {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
    pub file_type: Option<String>,
    pub shared_by: Option<String>,
    pub shared_at: Option<u64>,
    pub relative_path: Option<String>,
    pub folder_name: Option<String>,
}

impl SharedFile {
    /// Describe a file by path, naming it after its final component
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self {
            id: crate::utils::generate_id(),
            name: crate::utils::get_filename(path).unwrap_or_else(|| "unnamed".to_string()),
            path: path.to_path_buf(),
            file_type: None,
            shared_by: None,
            shared_at: Some(crate::utils::now_millis()),
            relative_path: None,
            folder_name: None,
        }
    }

    /// Build the wire header; `size` is taken from disk, never trusted from the caller
    pub fn header(&self, size: u64, from: &ProfileSnapshot) -> FileHeader {
        FileHeader {
            id: self.id.clone(),
            name: self.name.clone(),
            size,
            file_type: self.file_type.clone(),
            shared_by: self.shared_by.clone(),
            shared_at: self.shared_at,
            from: from.clone(),
            relative_path: self.relative_path.clone(),
            folder_name: self.folder_name.clone(),
        }
    }
}

/// An accepted file after it has been written under the sync folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceivedFile {
    #[serde(flatten)]
    pub header: FileHeader,
    pub path: PathBuf,
}

/// Sender-side lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferStatus {
    Connecting,
    Sending,
    Paused,
    Cancelled,
    Completed,
    Failed,
}

impl TransferStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransferStatus::Cancelled | TransferStatus::Completed | TransferStatus::Failed
        )
    }
}

/// Snapshot of a send task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferState {
    pub status: TransferStatus,
    pub bytes_transferred: u64,
    pub total_bytes: u64,
}

impl TransferState {
    pub fn new(total_bytes: u64) -> Self {
        Self {
            status: TransferStatus::Connecting,
            bytes_transferred: 0,
            total_bytes,
        }
    }

    pub fn percentage(&self) -> u32 {
        crate::utils::percent_of(self.bytes_transferred, self.total_bytes)
    }
}

/// Why an incoming file was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockReason {
    FileTooLarge,
    StorageFull,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::FileTooLarge => write!(f, "FILE_TOO_LARGE"),
            BlockReason::StorageFull => write!(f, "STORAGE_FULL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    Allowed,
    Rejected(BlockReason),
}

impl QuotaDecision {
    pub fn is_allowed(self) -> bool {
        matches!(self, QuotaDecision::Allowed)
    }
}

/// Progress reported to a send task's callback after every chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendProgress {
    pub percent: u32,
    pub bytes_sent: u64,
    pub total_bytes: u64,
}

/// Progress of an inbound transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveProgress {
    pub file_id: String,
    pub file_name: String,
    pub file_type: Option<String>,
    pub bytes_received: u64,
    pub total_bytes: u64,
    pub progress: u32,
    pub relative_path: Option<String>,
    pub local_path: PathBuf,
    pub from: ProfileSnapshot,
    pub direction: &'static str,
}

/// Everything the transport reports to the application layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum PeerEvent {
    PairRequest {
        #[serde(flatten)]
        profile: ProfileSnapshot,
    },
    FileAnnounce {
        file: serde_json::Value,
        from: ProfileSnapshot,
    },
    FileDelete {
        #[serde(rename = "fileId")]
        file_id: String,
        from: ProfileSnapshot,
    },
    ProfileUpdate {
        profile: ProfileSnapshot,
    },
    FileReceived {
        file: ReceivedFile,
        from: ProfileSnapshot,
    },
    FileProgress(ReceiveProgress),
    FileBlocked {
        file: FileHeader,
        from: ProfileSnapshot,
        reason: BlockReason,
    },
}

impl PeerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PeerEvent::PairRequest { .. } => "pair-request",
            PeerEvent::FileAnnounce { .. } => "file-announce",
            PeerEvent::FileDelete { .. } => "file-delete",
            PeerEvent::ProfileUpdate { .. } => "profile-update",
            PeerEvent::FileReceived { .. } => "file-received",
            PeerEvent::FileProgress(_) => "file-progress",
            PeerEvent::FileBlocked { .. } => "file-blocked",
        }
    }
}
