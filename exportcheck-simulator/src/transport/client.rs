use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::trace;

use exportcheck_core::TelemetryBatch;

use super::{Endpoint, ExportFrame, ExportFrameCodec, ExportService, Status};

const MAX_IDLE_CONNECTIONS: usize = 8;

type Connection = Framed<TcpStream, ExportFrameCodec>;

/// Handle exporters use to call an [`Endpoint`]. Cheap to clone; clones
/// share the connection pool.
#[derive(Clone)]
pub struct ExportClient {
    inner: ClientInner,
}

#[derive(Clone)]
enum ClientInner {
    Local(Arc<dyn ExportService>),
    Tcp(Arc<ConnectionPool>),
}

impl ExportClient {
    /// Connections are opened lazily on the first call.
    pub fn connect(endpoint: &Endpoint) -> Self {
        let inner = match endpoint {
            Endpoint::Local(service) => ClientInner::Local(service.clone()),
            Endpoint::Tcp(addr) => ClientInner::Tcp(Arc::new(ConnectionPool::new(*addr))),
        };
        Self { inner }
    }

    /// One delivery attempt. Exceeding `timeout` yields `DeadlineExceeded`.
    pub async fn export(&self, batch: TelemetryBatch, timeout: Duration) -> Result<(), Status> {
        let call = async {
            match &self.inner {
                ClientInner::Local(service) => service.export(batch).await,
                ClientInner::Tcp(pool) => pool.call(batch).await,
            }
        };
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Status::deadline_exceeded(format!(
                "no response within {timeout:?}"
            ))),
        }
    }

    /// Idle pooled connections; always zero for in-process endpoints.
    pub fn idle_connections(&self) -> usize {
        match &self.inner {
            ClientInner::Local(_) => 0,
            ClientInner::Tcp(pool) => pool.idle.lock().len(),
        }
    }
}

struct ConnectionPool {
    addr: SocketAddr,
    idle: Mutex<Vec<Connection>>,
}

impl ConnectionPool {
    fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            idle: Mutex::new(Vec::new()),
        }
    }

    async fn call(&self, batch: TelemetryBatch) -> Result<(), Status> {
        let pooled = self.idle.lock().pop();
        let mut conn = match pooled {
            Some(conn) => conn,
            None => {
                trace!(addr = %self.addr, "Opening export connection");
                let stream = TcpStream::connect(self.addr)
                    .await
                    .map_err(|e| Status::unavailable(format!("connect {}: {e}", self.addr)))?;
                Framed::new(stream, ExportFrameCodec::new())
            }
        };

        // Any failure below drops `conn`, so broken connections never return to the pool.
        conn.send(ExportFrame::Request { batch })
            .await
            .map_err(|e| Status::unavailable(format!("send failed: {e}")))?;

        match conn.next().await {
            Some(Ok(ExportFrame::Response { status })) => {
                self.release(conn);
                status.into_result()
            }
            Some(Ok(ExportFrame::Request { .. })) => {
                Err(Status::internal("receiver answered with a request frame"))
            }
            Some(Err(e)) => Err(Status::unavailable(format!("receive failed: {e}"))),
            None => Err(Status::unavailable("connection closed by receiver")),
        }
    }

    fn release(&self, conn: Connection) {
        let mut idle = self.idle.lock();
        if idle.len() < MAX_IDLE_CONNECTIONS {
            idle.push(conn);
        }
    }
}
