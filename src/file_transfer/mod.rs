pub mod quota;
pub mod receiver;
pub mod task;

// Re-exports for easier access from crate::file_transfer::{...}
pub use quota::{QuotaGuard, StoragePolicy, folder_size};
pub use receiver::{ReceiveContext, ReceiveOutcome, handle_transfer_connection};
pub use task::{SendFileTask, TaskController, create_send_file_task};
