use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::info;

use super::{bind, config::TransportConfig, control, transfer};
use crate::core::{EventPublisher, PeerAddress, PeerEvent, ProfileSnapshot, SendProgress, SharedFile, TransportResult};
use crate::file_transfer::{
    quota::QuotaGuard,
    receiver::ReceiveContext,
    task::{SendFileTask, create_send_file_task},
};
use crate::infrastructure::events::ChannelEventPublisher;

/// Owns both listeners and the live storage policy
///
/// Settings are pushed in through the setters and apply to the next
/// incoming header, including on an already started transport.
pub struct PeerTransport {
    config: TransportConfig,
    quota: QuotaGuard,
    events: ChannelEventPublisher,
}

impl PeerTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self::with_publisher(config, ChannelEventPublisher::new())
    }

    pub fn with_publisher(config: TransportConfig, events: ChannelEventPublisher) -> Self {
        Self {
            config,
            quota: QuotaGuard::new(),
            events,
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn quota(&self) -> &QuotaGuard {
        &self.quota
    }

    pub fn events(&self) -> &ChannelEventPublisher {
        &self.events
    }

    pub fn set_sync_folder(&self, folder: Option<PathBuf>) {
        if let Some(path) = &folder {
            info!(path = %path.display(), "Sync folder set");
        }
        self.quota.set_sync_folder(folder);
    }

    /// `None` or zero leaves a limit unset
    pub fn set_storage_limits(&self, max_storage_bytes: Option<u64>, max_file_bytes: Option<u64>) {
        self.quota.set_storage_limits(max_storage_bytes, max_file_bytes);
    }

    /// Receive every event published from now on
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<PeerEvent> {
        self.events.subscribe()
    }

    /// Bind both ports and start serving; a bind failure is returned, not retried
    pub async fn start(&self) -> TransportResult<TransportHandle> {
        let control_listener = bind(self.config.control_addr()).await?;
        let transfer_listener = bind(self.config.transfer_addr()).await?;
        let control_addr = control_listener.local_addr()?;
        let transfer_addr = transfer_listener.local_addr()?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let publisher: Arc<dyn EventPublisher> = Arc::new(self.events.clone());

        let control_task = tokio::spawn(control::run_control_server(
            control_listener,
            Arc::clone(&publisher),
            self.config.max_control_message_len,
            shutdown_rx.clone(),
        ));

        let ctx = ReceiveContext {
            quota: self.quota.clone(),
            publisher,
            max_header_len: self.config.max_header_len,
            chunk_size: self.config.chunk_size,
            idle_timeout: self.config.transfer_idle_timeout,
        };
        let transfer_task = tokio::spawn(transfer::run_transfer_server(transfer_listener, ctx, shutdown_rx));

        info!(%control_addr, %transfer_addr, "Peer transport listening");
        Ok(TransportHandle {
            control_addr,
            transfer_addr,
            shutdown,
            tasks: vec![control_task, transfer_task],
        })
    }

    pub async fn send_pair_request(&self, peer: &PeerAddress, profile: &ProfileSnapshot) -> TransportResult {
        control::send_pair_request(peer, profile, &self.config).await
    }

    pub async fn announce_file_delete(
        &self,
        peer: &PeerAddress,
        file_id: &str,
        from: &ProfileSnapshot,
    ) -> TransportResult {
        control::announce_file_delete(peer, file_id, from, &self.config).await
    }

    pub async fn announce_profile_update(&self, peer: &PeerAddress, profile: &ProfileSnapshot) -> TransportResult {
        control::announce_profile_update(peer, profile, &self.config).await
    }

    pub async fn announce_file(&self, peer: &PeerAddress, file: &Value, from: &ProfileSnapshot) -> TransportResult {
        control::announce_file(peer, file, from, &self.config).await
    }

    pub async fn broadcast_profile_update(
        &self,
        peers: &[PeerAddress],
        profile: &ProfileSnapshot,
    ) -> Vec<(PeerAddress, TransportResult)> {
        control::broadcast_profile_update(peers, profile, &self.config).await
    }

    /// Start uploading `file` to `peer`
    pub fn send_file<F>(&self, peer: &PeerAddress, file: SharedFile, from: &ProfileSnapshot, on_progress: F) -> SendFileTask
    where
        F: FnMut(SendProgress) + Send + 'static,
    {
        create_send_file_task(peer, file, from, &self.config, on_progress)
    }
}

/// Running listeners; dropping the handle also stops them
pub struct TransportHandle {
    control_addr: SocketAddr,
    transfer_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl TransportHandle {
    pub fn control_addr(&self) -> SocketAddr {
        self.control_addr
    }

    pub fn transfer_addr(&self) -> SocketAddr {
        self.transfer_addr
    }

    /// How a peer on `host` reaches these listeners
    pub fn peer_address(&self, host: impl Into<String>) -> PeerAddress {
        PeerAddress::with_ports(host, self.control_addr.port(), self.transfer_addr.port())
    }

    /// Close both listeners and wait until they are gone
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
        info!("Peer transport stopped");
    }
}
