use std::io;
use thiserror::Error;

/// Outcome of a client-initiated control or transfer call
pub type TransportResult<T = ()> = Result<T, TransportError>;

/// Transport operation errors
///
/// The `Display` strings are the `error` values peers and the UI layer see.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Cancelled")]
    Cancelled,

    #[error("Incomplete transfer")]
    Incomplete { sent: u64, total: u64 },

    #[error("Failed to read file")]
    ReadFailed,

    #[error("File not found")]
    FileNotFound,

    #[error("Connection timeout")]
    Timeout,

    #[error("Peer rejected pairing")]
    PeerRejected,

    #[error("Invalid response")]
    InvalidResponse,

    #[error("Failed to bind {addr}: {message}")]
    Bind { addr: String, message: String },

    #[error("Invalid file header: {0}")]
    InvalidHeader(String),

    #[error("Invalid control message: {0}")]
    InvalidMessage(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Io(String),
}

impl TransportError {
    /// Cancellation is a user decision, not a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransportError::Cancelled)
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut => TransportError::Timeout,
            _ => TransportError::Io(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::InvalidHeader(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_strings_match_wire_outcomes() {
        assert_eq!(TransportError::Cancelled.to_string(), "Cancelled");
        assert_eq!(
            TransportError::Incomplete { sent: 1, total: 2 }.to_string(),
            "Incomplete transfer"
        );
        assert_eq!(TransportError::ReadFailed.to_string(), "Failed to read file");
        assert_eq!(TransportError::Timeout.to_string(), "Connection timeout");
    }

    #[test]
    fn test_io_conversion() {
        let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused");
        assert_eq!(
            TransportError::from(refused),
            TransportError::Io("connection refused".to_string())
        );

        let timed_out = io::Error::new(io::ErrorKind::TimedOut, "timed out");
        assert_eq!(TransportError::from(timed_out), TransportError::Timeout);
        assert!(!TransportError::Timeout.is_cancelled());
        assert!(TransportError::Cancelled.is_cancelled());
    }
}
