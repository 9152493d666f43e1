pub mod config;
pub mod control;
pub mod service;
pub mod transfer;

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::core::{TransportError, TransportResult};

pub use config::TransportConfig;
pub use control::{
    announce_file, announce_file_delete, announce_profile_update, broadcast_profile_update,
    send_pair_request,
};
pub use service::{PeerTransport, TransportHandle};

/// Open a TCP connection, giving up after `limit`
pub async fn connect_with_timeout(target: (&str, u16), limit: Duration) -> TransportResult<TcpStream> {
    match tokio::time::timeout(limit, TcpStream::connect(target)).await {
        Ok(connected) => Ok(connected?),
        Err(_) => Err(TransportError::Timeout),
    }
}

/// Bind a listener, reporting the address on failure
pub async fn bind(addr: SocketAddr) -> TransportResult<TcpListener> {
    TcpListener::bind(addr).await.map_err(|e| TransportError::Bind {
        addr: addr.to_string(),
        message: e.to_string(),
    })
}

/// Accept until `shutdown` flips or its sender goes away, spawning
/// `handle` for every connection
pub(crate) async fn accept_loop<H, Fut>(
    listener: TcpListener,
    mut shutdown: watch::Receiver<bool>,
    channel: &'static str,
    handle: H,
) where
    H: Fn(TcpStream, SocketAddr) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    debug!(channel, peer = %addr, "Accepted connection");
                    tokio::spawn(handle(stream, addr));
                }
                Err(e) => warn!(channel, error = %e, "Accept failed"),
            },
        }
    }
    debug!(channel, "Listener closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_reports_port_in_use() {
        let first = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let taken = first.local_addr().unwrap();

        match bind(taken).await {
            Err(TransportError::Bind { addr, .. }) => assert_eq!(addr, taken.to_string()),
            other => panic!("expected bind error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_connect_refused_is_an_error() {
        let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = connect_with_timeout(("127.0.0.1", port), Duration::from_secs(1)).await;
        assert!(matches!(result, Err(TransportError::Io(_))));
    }
}
