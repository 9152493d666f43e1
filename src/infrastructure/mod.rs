pub mod config;
pub mod events;

pub use config::{AppConfig, NetworkSettings, StorageSettings};
pub use events::{ChannelEventPublisher, InMemoryEventPublisher, LoggingEventHandler};
