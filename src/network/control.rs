//! Control channel: one small JSON document per short-lived connection.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{accept_loop, connect_with_timeout, config::TransportConfig};
use crate::core::{EventPublisher, PeerAddress, PeerEvent, ProfileSnapshot, TransportError, TransportResult};
use crate::protocol::{ControlDecoder, ControlMessage, Decoded};

const READ_BUFFER: usize = 8 * 1024;

/// Serve the control port until shutdown
pub async fn run_control_server(
    listener: TcpListener,
    publisher: Arc<dyn EventPublisher>,
    max_message_len: usize,
    shutdown: watch::Receiver<bool>,
) {
    accept_loop(listener, shutdown, "control", move |stream, addr: SocketAddr| {
        let publisher = Arc::clone(&publisher);
        async move {
            if let Err(e) = handle_control_connection(stream, publisher.as_ref(), max_message_len).await {
                warn!(peer = %addr, error = %e, "Control connection failed");
            }
        }
    })
    .await;
}

/// Dispatch every message arriving on one connection; returns how many were handled
pub async fn handle_control_connection<S>(
    mut stream: S,
    publisher: &dyn EventPublisher,
    max_message_len: usize,
) -> TransportResult<usize>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut decoder = ControlDecoder::new(max_message_len);
    let mut buffer = vec![0u8; READ_BUFFER];
    let mut handled = 0;

    loop {
        let n = stream.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        for decoded in decoder.push(&buffer[..n])? {
            match decoded {
                Decoded::Message(message) => {
                    dispatch(message, &mut stream, publisher).await?;
                    handled += 1;
                }
                Decoded::Unknown { kind } => warn!(kind = %kind, "Unknown control message type"),
            }
        }
    }

    if decoder.pending() > 0 {
        debug!(bytes = decoder.pending(), "Control connection closed mid-message");
    }
    Ok(handled)
}

async fn dispatch<S>(message: ControlMessage, stream: &mut S, publisher: &dyn EventPublisher) -> TransportResult
where
    S: AsyncWrite + Unpin,
{
    match message {
        ControlMessage::PairRequest {
            name,
            ip,
            profile_picture,
        } => {
            info!(name = %name, ip = %ip, "Pair request");
            publisher.publish(PeerEvent::PairRequest {
                profile: ProfileSnapshot {
                    name,
                    ip,
                    profile_picture,
                },
            });
            let ack = ControlMessage::PairAck { success: true }.encode()?;
            stream.write_all(&ack).await?;
            stream.flush().await?;
        }
        ControlMessage::FileAnnounce { file, from } => {
            publisher.publish(PeerEvent::FileAnnounce { file, from });
        }
        ControlMessage::FileDelete { file_id, from } => {
            info!(file_id = %file_id, from = %from.name, "File delete");
            publisher.publish(PeerEvent::FileDelete { file_id, from });
        }
        ControlMessage::ProfileUpdate { profile } => {
            info!(name = %profile.name, "Profile update");
            publisher.publish(PeerEvent::ProfileUpdate { profile });
        }
        ControlMessage::PairAck { .. } => {
            debug!("Ignoring unsolicited PAIR_ACK");
        }
    }
    Ok(())
}

/// Ask `peer` to pair; `Ok` once it acknowledges
pub async fn send_pair_request(
    peer: &PeerAddress,
    profile: &ProfileSnapshot,
    config: &TransportConfig,
) -> TransportResult {
    let result = pair(peer, profile, config).await;
    match &result {
        Ok(()) => info!(%peer, "Paired"),
        Err(e) => warn!(%peer, error = %e, "Pair request failed"),
    }
    result
}

async fn pair(peer: &PeerAddress, profile: &ProfileSnapshot, config: &TransportConfig) -> TransportResult {
    let mut stream = connect_with_timeout(peer.control_target(), config.connect_timeout).await?;
    stream
        .write_all(&ControlMessage::pair_request(profile).encode()?)
        .await?;

    let reply = tokio::time::timeout(
        config.connect_timeout,
        read_reply(&mut stream, config.max_control_message_len),
    )
    .await
    .map_err(|_| TransportError::Timeout)??;
    let _ = stream.shutdown().await;

    match reply {
        ControlMessage::PairAck { success: true } => Ok(()),
        ControlMessage::PairAck { success: false } => Err(TransportError::PeerRejected),
        _ => Err(TransportError::InvalidResponse),
    }
}

/// First document the peer writes back
async fn read_reply<S>(stream: &mut S, max_len: usize) -> TransportResult<ControlMessage>
where
    S: AsyncRead + Unpin,
{
    let mut decoder = ControlDecoder::new(max_len);
    let mut buffer = vec![0u8; READ_BUFFER];
    loop {
        let n = stream.read(&mut buffer).await?;
        if n == 0 {
            return Err(TransportError::InvalidResponse);
        }
        let decoded = decoder
            .push(&buffer[..n])
            .map_err(|_| TransportError::InvalidResponse)?;
        match decoded.into_iter().next() {
            Some(Decoded::Message(message)) => return Ok(message),
            Some(Decoded::Unknown { .. }) => return Err(TransportError::InvalidResponse),
            None => continue,
        }
    }
}

/// Write one message and close
async fn send_message(peer: &PeerAddress, message: &ControlMessage, config: &TransportConfig) -> TransportResult {
    let payload = message.encode()?;
    let mut stream = connect_with_timeout(peer.control_target(), config.connect_timeout).await?;
    stream.write_all(&payload).await?;
    stream.shutdown().await?;
    debug!(%peer, kind = message.kind(), "Control message sent");
    Ok(())
}

async fn send_logged(peer: &PeerAddress, message: ControlMessage, config: &TransportConfig) -> TransportResult {
    let result = send_message(peer, &message, config).await;
    if let Err(e) = &result {
        warn!(%peer, kind = message.kind(), error = %e, "Control message failed");
    }
    result
}

/// Tell `peer` that a shared file was removed
pub async fn announce_file_delete(
    peer: &PeerAddress,
    file_id: &str,
    from: &ProfileSnapshot,
    config: &TransportConfig,
) -> TransportResult {
    let message = ControlMessage::FileDelete {
        file_id: file_id.to_string(),
        from: from.clone(),
    };
    send_logged(peer, message, config).await
}

pub async fn announce_profile_update(
    peer: &PeerAddress,
    profile: &ProfileSnapshot,
    config: &TransportConfig,
) -> TransportResult {
    let message = ControlMessage::ProfileUpdate {
        profile: profile.clone(),
    };
    send_logged(peer, message, config).await
}

/// Metadata-only announcement used by older peers
pub async fn announce_file(
    peer: &PeerAddress,
    file: &Value,
    from: &ProfileSnapshot,
    config: &TransportConfig,
) -> TransportResult {
    let message = ControlMessage::FileAnnounce {
        file: file.clone(),
        from: from.clone(),
    };
    send_logged(peer, message, config).await
}

/// Send the profile to every peer concurrently, one outcome per peer in input order
pub async fn broadcast_profile_update(
    peers: &[PeerAddress],
    profile: &ProfileSnapshot,
    config: &TransportConfig,
) -> Vec<(PeerAddress, TransportResult)> {
    let sends = peers.iter().map(|peer| async move {
        let result = announce_profile_update(peer, profile, config).await;
        (peer.clone(), result)
    });
    join_all(sends).await
}
