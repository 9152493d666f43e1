use async_trait::async_trait;

use super::domain::PeerEvent;

/// Sink for transport events
///
/// Publishing never blocks and never fails; a subscriber that went away
/// simply stops receiving.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: PeerEvent);
}

/// Callback-style consumer of transport events
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: PeerEvent);
}
