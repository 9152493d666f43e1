//! Outbound file transfer with pause, resume and cancel.
//!
//! A task settles exactly once. The completion value travels through a
//! oneshot channel whose sender is taken out of a mutex by whoever settles
//! first, so a later cancel, error or close has nothing left to send on.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use crate::core::{
    FileHeader, PeerAddress, ProfileSnapshot, SendProgress, SharedFile, TransferState,
    TransferStatus, TransportError, TransportResult,
};
use crate::network::{self, config::TransportConfig};
use crate::protocol::write_header;
use crate::utils::percent_of;

/// What the worker should currently be doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Run,
    Pause,
    Cancel,
}

struct Shared {
    state: Mutex<TransferState>,
    settle: Mutex<Option<oneshot::Sender<TransportResult>>>,
    signal: watch::Sender<Signal>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, TransferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// First caller wins; returns false if the task was already settled
    fn settle(&self, result: TransportResult) -> bool {
        let Some(sender) = self
            .settle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return false;
        };

        self.state().status = match &result {
            Ok(()) => TransferStatus::Completed,
            Err(TransportError::Cancelled) => TransferStatus::Cancelled,
            Err(_) => TransferStatus::Failed,
        };
        let _ = sender.send(result);
        true
    }

    /// Header is on the wire; honour a pause requested while connecting
    fn begin_sending(&self) {
        // pause() publishes its signal under the state lock
        let mut state = self.state();
        let paused = *self.signal.borrow() == Signal::Pause;
        if !state.status.is_terminal() {
            state.status = if paused {
                TransferStatus::Paused
            } else {
                TransferStatus::Sending
            };
        }
    }

    fn record_progress(&self, sent: u64) {
        let mut state = self.state();
        if !state.status.is_terminal() {
            state.bytes_transferred = sent;
        }
    }
}

/// Cloneable handle to control a running send task
#[derive(Clone)]
pub struct TaskController {
    shared: Arc<Shared>,
}

impl TaskController {
    /// Stop reading and writing chunks. Idempotent.
    pub fn pause(&self) {
        let mut state = self.shared.state();
        if state.status.is_terminal() {
            return;
        }
        if state.status == TransferStatus::Sending {
            state.status = TransferStatus::Paused;
        }
        self.shared.signal.send_replace(Signal::Pause);
    }

    /// Continue after `pause`; no-op when not paused
    pub fn resume(&self) {
        let mut state = self.shared.state();
        if state.status.is_terminal() {
            return;
        }
        if state.status == TransferStatus::Paused {
            state.status = TransferStatus::Sending;
        }
        self.shared.signal.send_if_modified(|signal| {
            if *signal == Signal::Pause {
                *signal = Signal::Run;
                true
            } else {
                false
            }
        });
    }

    /// Settle with `Cancelled` unless already settled, then tear down the
    /// connection and source file
    pub fn cancel(&self) {
        if self.shared.settle(Err(TransportError::Cancelled)) {
            info!("Transfer cancelled");
        }
        self.shared.signal.send_replace(Signal::Cancel);
    }

    pub fn state(&self) -> TransferState {
        *self.shared.state()
    }
}

/// A single outbound upload
pub struct SendFileTask {
    controller: TaskController,
    completion: oneshot::Receiver<TransportResult>,
}

impl SendFileTask {
    pub fn controller(&self) -> TaskController {
        self.controller.clone()
    }

    pub fn pause(&self) {
        self.controller.pause();
    }

    pub fn resume(&self) {
        self.controller.resume();
    }

    pub fn cancel(&self) {
        self.controller.cancel();
    }

    pub fn state(&self) -> TransferState {
        self.controller.state()
    }

    /// Wait for the settled outcome
    pub async fn wait(self) -> TransportResult {
        self.completion
            .await
            .unwrap_or_else(|_| Err(TransportError::Io("transfer task aborted".to_string())))
    }

    fn failed(error: TransportError) -> Self {
        let (settle_tx, completion) = oneshot::channel();
        let mut state = TransferState::new(0);
        state.status = TransferStatus::Failed;
        let _ = settle_tx.send(Err(error));

        let (signal, _) = watch::channel(Signal::Run);
        Self {
            controller: TaskController {
                shared: Arc::new(Shared {
                    state: Mutex::new(state),
                    settle: Mutex::new(None),
                    signal,
                }),
            },
            completion,
        }
    }
}

struct SendJob {
    host: String,
    port: u16,
    path: PathBuf,
    header: FileHeader,
    chunk_size: usize,
    connect_timeout: Duration,
}

/// Start streaming `file` to `peer`'s transfer port
///
/// `on_progress` runs after every chunk has been written. A missing source
/// file yields a task that has already failed with `FileNotFound`.
pub fn create_send_file_task<F>(
    peer: &PeerAddress,
    file: SharedFile,
    from: &ProfileSnapshot,
    config: &TransportConfig,
    on_progress: F,
) -> SendFileTask
where
    F: FnMut(SendProgress) + Send + 'static,
{
    let size = match std::fs::metadata(&file.path) {
        Ok(metadata) if metadata.is_file() => metadata.len(),
        _ => {
            warn!(path = %file.path.display(), "File not found");
            return SendFileTask::failed(TransportError::FileNotFound);
        }
    };

    let (settle_tx, completion) = oneshot::channel();
    let (signal, _) = watch::channel(Signal::Run);
    let shared = Arc::new(Shared {
        state: Mutex::new(TransferState::new(size)),
        settle: Mutex::new(Some(settle_tx)),
        signal,
    });

    let (host, port) = peer.transfer_target();
    let job = SendJob {
        host: host.to_string(),
        port,
        header: file.header(size, from),
        path: file.path,
        chunk_size: config.chunk_size.max(1),
        connect_timeout: config.connect_timeout,
    };

    tokio::spawn(run(Arc::clone(&shared), job, on_progress));

    SendFileTask {
        controller: TaskController { shared },
        completion,
    }
}

async fn run<F>(shared: Arc<Shared>, job: SendJob, mut on_progress: F)
where
    F: FnMut(SendProgress) + Send + 'static,
{
    let mut cancel_rx = shared.signal.subscribe();
    let mut pause_rx = shared.signal.subscribe();
    let name = job.header.name.clone();
    let peer = job.host.clone();

    let result = tokio::select! {
        biased;
        _ = cancelled(&mut cancel_rx) => {
            debug!(file = %name, "Dropping cancelled transfer");
            return;
        }
        result = transfer(&shared, &mut pause_rx, job, &mut on_progress) => result,
    };

    match &result {
        Ok(()) => info!(file = %name, %peer, "File sent"),
        Err(e) => warn!(file = %name, %peer, error = %e, "File send failed"),
    }
    shared.settle(result);
}

async fn transfer<F>(
    shared: &Shared,
    signal_rx: &mut watch::Receiver<Signal>,
    job: SendJob,
    on_progress: &mut F,
) -> TransportResult
where
    F: FnMut(SendProgress),
{
    let source = File::open(&job.path)
        .await
        .map_err(|_| TransportError::ReadFailed)?;
    let mut socket = network::connect_with_timeout((job.host.as_str(), job.port), job.connect_timeout).await?;

    write_header(&mut socket, &job.header).await?;
    shared.begin_sending();
    info!(file = %job.header.name, size = job.header.size, peer = %job.host, "Sending file");

    let total = job.header.size;
    let mut reader = source.take(total);
    let mut buffer = vec![0u8; job.chunk_size];
    let mut sent: u64 = 0;

    loop {
        wait_while_paused(signal_rx).await;

        let n = reader
            .read(&mut buffer)
            .await
            .map_err(|_| TransportError::ReadFailed)?;
        if n == 0 {
            break;
        }
        socket.write_all(&buffer[..n]).await?;
        sent += n as u64;

        shared.record_progress(sent);
        on_progress(SendProgress {
            percent: percent_of(sent, total),
            bytes_sent: sent,
            total_bytes: total,
        });
    }

    // Half-close, then let the receiver close once it has everything
    socket.shutdown().await?;
    let mut sink = [0u8; 256];
    while let Ok(n) = socket.read(&mut sink).await {
        if n == 0 {
            break;
        }
    }

    if sent == total {
        Ok(())
    } else {
        Err(TransportError::Incomplete { sent, total })
    }
}

async fn wait_while_paused(signal_rx: &mut watch::Receiver<Signal>) {
    let _ = signal_rx.wait_for(|signal| *signal != Signal::Pause).await;
}

async fn cancelled(signal_rx: &mut watch::Receiver<Signal>) {
    if signal_rx.wait_for(|signal| *signal == Signal::Cancel).await.is_err() {
        std::future::pending::<()>().await;
    }
}
