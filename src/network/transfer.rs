use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::accept_loop;
use crate::file_transfer::receiver::{ReceiveContext, handle_transfer_connection};

/// Serve the transfer port until shutdown, one task per inbound file
pub async fn run_transfer_server(
    listener: TcpListener,
    ctx: ReceiveContext,
    shutdown: watch::Receiver<bool>,
) {
    accept_loop(listener, shutdown, "transfer", move |stream, addr: SocketAddr| {
        let ctx = ctx.clone();
        async move {
            match handle_transfer_connection(stream, &ctx).await {
                Ok(outcome) => debug!(peer = %addr, ?outcome, "Transfer connection finished"),
                Err(e) => warn!(peer = %addr, error = %e, "Transfer connection failed"),
            }
        }
    })
    .await;
}
