use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use exportcheck_core::HarnessError;

use super::{BoundReceiver, Endpoint, ExportFrame, ExportFrameCodec, ExportService, ReceiverBinding, Status};

/// Serves an [`ExportService`] on a TCP socket.
#[derive(Debug, Clone, Copy)]
pub struct TcpBinding {
    addr: SocketAddr,
}

impl TcpBinding {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    /// Loopback with an ephemeral port.
    pub fn localhost() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 0)))
    }
}

#[async_trait]
impl ReceiverBinding for TcpBinding {
    async fn bind(&self, service: Arc<dyn ExportService>) -> Result<BoundReceiver, HarnessError> {
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|e| HarnessError::Transport(format!("bind {}: {e}", self.addr)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| HarnessError::Transport(e.to_string()))?;
        info!(%local_addr, "Simulated receiver listening");

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(accept_loop(listener, service, shutdown.clone()));
        Ok(BoundReceiver::new(
            Endpoint::Tcp(local_addr),
            shutdown,
            Some(task),
        ))
    }
}

async fn accept_loop(
    listener: TcpListener,
    service: Arc<dyn ExportService>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let service = service.clone();
                    let token = shutdown.child_token();
                    tokio::spawn(serve_connection(stream, peer, service, token));
                }
                Err(e) => warn!("Failed to accept connection: {e}"),
            },
        }
    }
    debug!("Accept loop stopped");
}

#[instrument(skip(stream, service, shutdown))]
async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    service: Arc<dyn ExportService>,
    shutdown: CancellationToken,
) {
    let mut framed = Framed::new(stream, ExportFrameCodec::new());
    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = framed.next() => frame,
        };
        let status = match frame {
            None => break,
            Some(Ok(ExportFrame::Request { batch })) => match service.export(batch).await {
                Ok(()) => Status::ok(),
                Err(status) => status,
            },
            Some(Ok(ExportFrame::Response { .. })) => {
                warn!("Client sent a response frame, closing connection");
                break;
            }
            Some(Err(e)) => {
                warn!("Unreadable frame: {e}");
                // The framed stream ends after any decode error, even when only
                // the JSON inside a complete frame was bad. Answer once and hang up.
                let _ = framed
                    .send(ExportFrame::Response {
                        status: Status::invalid_argument(e.to_string()),
                    })
                    .await;
                break;
            }
        };
        if let Err(e) = framed.send(ExportFrame::Response { status }).await {
            debug!("Client went away: {e}");
            break;
        }
    }
}
