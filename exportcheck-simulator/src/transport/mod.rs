//! ## exportcheck-simulator::transport
//! **How exporters reach the simulated receiver**
//!
//! The receiver implements exactly one RPC, [`ExportService::export`], and
//! signals failures with a small status taxonomy. Only the retryable versus
//! terminal distinction matters to the delivery contract.
//!
//! ### Key Submodules:
//! - `codec`: length-delimited JSON frames for the TCP binding
//! - `client`: what exporters hold to call an [`Endpoint`]
//! - `tcp`: socket server binding, one task per connection

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use exportcheck_core::{HarnessError, TelemetryBatch};

pub mod client;
pub mod codec;
pub mod tcp;

pub use client::ExportClient;
pub use codec::{CodecError, ExportFrame, ExportFrameCodec};
pub use tcp::TcpBinding;

/// Status codes understood by exporters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    Ok,
    InvalidArgument,
    DeadlineExceeded,
    Unavailable,
    Internal,
}

impl StatusCode {
    /// Whether a sender may resend the same batch after this code.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StatusCode::DeadlineExceeded | StatusCode::Unavailable)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{code:?}: {message}")]
pub struct Status {
    pub code: StatusCode,
    pub message: String,
}

impl Status {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn ok() -> Self {
        Self::new(StatusCode::Ok, "")
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(StatusCode::InvalidArgument, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(StatusCode::DeadlineExceeded, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Unavailable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Internal, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// `Ok` becomes `Ok(())`, every other code an error.
    pub fn into_result(self) -> Result<(), Status> {
        match self.code {
            StatusCode::Ok => Ok(()),
            _ => Err(self),
        }
    }
}

/// The single RPC a receiver serves.
#[async_trait]
pub trait ExportService: Send + Sync {
    async fn export(&self, batch: TelemetryBatch) -> Result<(), Status>;
}

/// Address an exporter is configured with.
#[derive(Clone)]
pub enum Endpoint {
    /// Direct calls into a service living in the same process.
    Local(Arc<dyn ExportService>),
    Tcp(SocketAddr),
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Local(_) => f.write_str("Local"),
            Endpoint::Tcp(addr) => write!(f, "Tcp({addr})"),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Local(_) => f.write_str("in-process"),
            Endpoint::Tcp(addr) => write!(f, "tcp://{addr}"),
        }
    }
}

/// Makes a service reachable and hands back the endpoint exporters should use.
#[async_trait]
pub trait ReceiverBinding: Send + Sync {
    async fn bind(&self, service: Arc<dyn ExportService>) -> Result<BoundReceiver, HarnessError>;
}

/// A service registered on some transport. Dropping it without calling
/// [`BoundReceiver::shutdown`] leaves a TCP listener running until the runtime stops.
pub struct BoundReceiver {
    endpoint: Endpoint,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl BoundReceiver {
    pub(crate) fn new(
        endpoint: Endpoint,
        shutdown: CancellationToken,
        task: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            endpoint,
            shutdown,
            task,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Stops accepting calls and waits for the server task, if any.
    pub async fn shutdown(mut self) -> Result<(), JoinError> {
        self.shutdown.cancel();
        match self.task.take() {
            Some(task) => task.await,
            None => Ok(()),
        }
    }
}

/// Binding that performs no I/O; exporters call the service directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct InProcessBinding;

#[async_trait]
impl ReceiverBinding for InProcessBinding {
    async fn bind(&self, service: Arc<dyn ExportService>) -> Result<BoundReceiver, HarnessError> {
        Ok(BoundReceiver::new(
            Endpoint::Local(service),
            CancellationToken::new(),
            None,
        ))
    }
}
