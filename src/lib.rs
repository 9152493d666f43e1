pub mod core;
pub mod file_transfer;
pub mod infrastructure;
pub mod network;
pub mod protocol;
pub mod utils;

// Re-export the main entry points for the binary and integration tests
pub use crate::core::{PeerAddress, PeerEvent, ProfileSnapshot, SharedFile, TransportError, TransportResult};
pub use file_transfer::{SendFileTask, TaskController, create_send_file_task};
pub use infrastructure::{AppConfig, ChannelEventPublisher};
pub use network::{PeerTransport, TransportConfig, TransportHandle};
