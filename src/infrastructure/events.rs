use crate::core::{
    domain::PeerEvent,
    traits::{EventHandler, EventPublisher},
};
use crate::utils::format_size;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// In-memory event publisher for testing and development
#[derive(Clone, Default)]
pub struct InMemoryEventPublisher {
    event_log: Arc<Mutex<Vec<PeerEvent>>>,
}

impl InMemoryEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all events that have been published (for testing)
    pub fn get_events(&self) -> Vec<PeerEvent> {
        self.event_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Events with the given `PeerEvent::name`
    pub fn events_named(&self, name: &str) -> Vec<PeerEvent> {
        self.get_events()
            .into_iter()
            .filter(|event| event.name() == name)
            .collect()
    }

    /// Clear the event log
    pub fn clear_events(&self) {
        self.event_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl EventPublisher for InMemoryEventPublisher {
    fn publish(&self, event: PeerEvent) {
        self.event_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// Fans every event out to any number of channel subscribers
///
/// Each subscriber sees events in publish order. Subscribers whose receiver
/// was dropped are pruned on the next publish.
#[derive(Clone, Default)]
pub struct ChannelEventPublisher {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<PeerEvent>>>>,
}

impl ChannelEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<PeerEvent> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        self.lock().push(event_tx);
        event_rx
    }

    /// Drive `handler` with every future event on its own task
    pub fn attach(&self, handler: Arc<dyn EventHandler>) -> JoinHandle<()> {
        let event_rx = self.subscribe();
        tokio::spawn(Self::start_processing(event_rx, handler))
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Event processing loop, ends once the publisher is dropped
    pub async fn start_processing(
        mut event_rx: mpsc::UnboundedReceiver<PeerEvent>,
        handler: Arc<dyn EventHandler>,
    ) {
        while let Some(event) = event_rx.recv().await {
            handler.handle_event(event).await;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::UnboundedSender<PeerEvent>>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventPublisher for ChannelEventPublisher {
    fn publish(&self, event: PeerEvent) {
        self.lock()
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}

/// Event handler for logging transport events
pub struct LoggingEventHandler;

#[async_trait]
impl EventHandler for LoggingEventHandler {
    async fn handle_event(&self, event: PeerEvent) {
        match &event {
            PeerEvent::PairRequest { profile } => {
                info!("Pair request from {} ({})", profile.name, profile.ip);
            }
            PeerEvent::FileAnnounce { file, from } => {
                info!(
                    "File announced by {}: {}",
                    from.name,
                    file.get("name").and_then(|n| n.as_str()).unwrap_or("unknown")
                );
            }
            PeerEvent::FileDelete { file_id, from } => {
                info!("File {} deleted by {}", file_id, from.name);
            }
            PeerEvent::ProfileUpdate { profile } => {
                info!("Profile update from {} ({})", profile.name, profile.ip);
            }
            PeerEvent::FileReceived { file, from } => {
                info!(
                    "File received from {}: {} ({}) -> {}",
                    from.name,
                    file.header.name,
                    format_size(file.header.size),
                    file.path.display()
                );
            }
            PeerEvent::FileProgress(progress) => {
                debug!(
                    "Receiving {}: {}% ({}/{})",
                    progress.file_name,
                    progress.progress,
                    progress.bytes_received,
                    progress.total_bytes
                );
            }
            PeerEvent::FileBlocked { file, from, reason } => {
                warn!("Blocked {} from {}: {}", file.name, from.name, reason);
            }
        }
    }
}
