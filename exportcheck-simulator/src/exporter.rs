//! # Exporter Collaborator
//!
//! The interface an exporter under test exposes to the harness, plus a
//! reference implementation that retries transient failures with
//! exponential backoff.
//!
//! [`RetryMode`] can make the reference exporter deliberately misbehave so
//! the contract checks have something to catch.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use exportcheck_config::ExporterConfig;
use exportcheck_core::{DataType, HarnessError, TelemetryBatch};

use crate::backoff::ExponentialBackoff;
use crate::transport::{Endpoint, ExportClient, Status};

/// Why `consume` gave up on a batch.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExportError {
    #[error("Permanent failure: {0}")]
    Permanent(Status),

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Status },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Exporter not started")]
    NotStarted,

    #[error("Exporter shut down")]
    ShutDown,
}

/// Exporter under test.
///
/// `consume` returns once the exporter is done with the batch, whether it
/// was delivered or not. Retrying is the exporter's job.
#[async_trait]
pub trait Exporter: Send + Sync {
    async fn start(&self) -> Result<(), ExportError>;
    async fn consume(&self, batch: TelemetryBatch) -> Result<(), ExportError>;
    async fn shutdown(&self) -> Result<(), ExportError>;
}

/// Builds a fresh exporter for each scenario.
pub trait ExporterFactory: Send + Sync {
    fn create(
        &self,
        settings: &ExporterConfig,
        data_type: DataType,
        endpoint: Endpoint,
    ) -> Result<Arc<dyn Exporter>, HarnessError>;
}

/// How the reference exporter treats failures.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryMode {
    /// Resend transient failures, never resend permanent ones.
    #[default]
    Compliant,
    /// Also resends a batch once after a permanent failure.
    ResendPermanent,
    /// Never resends anything.
    NeverRetry,
}

impl RetryMode {
    pub const ALL: [RetryMode; 3] = [
        RetryMode::Compliant,
        RetryMode::ResendPermanent,
        RetryMode::NeverRetry,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            RetryMode::Compliant => "compliant",
            RetryMode::ResendPermanent => "resend-permanent",
            RetryMode::NeverRetry => "never-retry",
        }
    }
}

impl fmt::Display for RetryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for RetryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RetryMode::ALL
            .into_iter()
            .find(|mode| mode.name() == s || mode.name().replace('-', "_") == s)
            .ok_or_else(|| format!("unknown exporter mode '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Running,
    Stopped,
}

pub struct RetryingExporter {
    data_type: DataType,
    settings: ExporterConfig,
    mode: RetryMode,
    client: ExportClient,
    lifecycle: Mutex<Lifecycle>,
    shutdown: CancellationToken,
}

impl RetryingExporter {
    pub fn new(
        settings: ExporterConfig,
        data_type: DataType,
        endpoint: &Endpoint,
        mode: RetryMode,
    ) -> Self {
        Self {
            data_type,
            settings,
            mode,
            client: ExportClient::connect(endpoint),
            lifecycle: Mutex::new(Lifecycle::Created),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.timeout_ms)
    }

    fn ensure_running(&self) -> Result<(), ExportError> {
        match *self.lifecycle.lock() {
            Lifecycle::Running => Ok(()),
            Lifecycle::Created => Err(ExportError::NotStarted),
            Lifecycle::Stopped => Err(ExportError::ShutDown),
        }
    }
}

#[async_trait]
impl Exporter for RetryingExporter {
    async fn start(&self) -> Result<(), ExportError> {
        let mut lifecycle = self.lifecycle.lock();
        match *lifecycle {
            Lifecycle::Stopped => Err(ExportError::ShutDown),
            _ => {
                *lifecycle = Lifecycle::Running;
                Ok(())
            }
        }
    }

    async fn consume(&self, batch: TelemetryBatch) -> Result<(), ExportError> {
        self.ensure_running()?;

        let started = Instant::now();
        let mut backoff = ExponentialBackoff::new(&self.settings.retry);
        let mut attempts = 0u32;
        let mut resent_permanent = false;

        loop {
            attempts += 1;
            let status = match self.client.export(batch.clone(), self.request_timeout()).await {
                Ok(()) => return Ok(()),
                Err(status) => status,
            };

            if !status.is_retryable() {
                if self.mode == RetryMode::ResendPermanent && !resent_permanent {
                    resent_permanent = true;
                    warn!(error = %status, "Resending batch after permanent failure");
                    continue;
                }
                debug!(error = %status, attempts, "Dropping batch");
                return Err(ExportError::Permanent(status));
            }

            if self.mode == RetryMode::NeverRetry || !self.settings.retry.enabled {
                return Err(ExportError::RetriesExhausted {
                    attempts,
                    last: status,
                });
            }

            let Some(delay) = backoff.next_delay(started.elapsed()) else {
                warn!(attempts, "Retry budget exhausted");
                return Err(ExportError::RetriesExhausted {
                    attempts,
                    last: status,
                });
            };
            debug!(error = %status, ?delay, attempts, "Retrying batch");

            tokio::select! {
                _ = self.shutdown.cancelled() => return Err(ExportError::ShutDown),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn shutdown(&self) -> Result<(), ExportError> {
        *self.lifecycle.lock() = Lifecycle::Stopped;
        self.shutdown.cancel();
        Ok(())
    }
}

/// Factory for [`RetryingExporter`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryingExporterFactory {
    mode: RetryMode,
}

impl RetryingExporterFactory {
    pub fn new(mode: RetryMode) -> Self {
        Self { mode }
    }
}

impl ExporterFactory for RetryingExporterFactory {
    fn create(
        &self,
        settings: &ExporterConfig,
        data_type: DataType,
        endpoint: Endpoint,
    ) -> Result<Arc<dyn Exporter>, HarnessError> {
        if settings.timeout_ms == 0 {
            return Err(HarnessError::Exporter("request timeout must be positive".into()));
        }
        info!(%data_type, %endpoint, mode = %self.mode, "Creating reference exporter");
        Ok(Arc::new(RetryingExporter::new(
            settings.clone(),
            data_type,
            &endpoint,
            self.mode,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receiver::SimulatedReceiver;
    use crate::transport::StatusCode;
    use exportcheck_core::decision::ScriptedDecision;
    use exportcheck_core::{DecisionOutcome, IdSet, UniqueId};

    fn fast_settings() -> ExporterConfig {
        let mut settings = ExporterConfig::default();
        settings.retry.initial_interval_ms = 1;
        settings.retry.max_interval_ms = 5;
        settings.retry.max_elapsed_ms = 2_000;
        settings
    }

    fn scripted(outcomes: Vec<DecisionOutcome>) -> Arc<SimulatedReceiver> {
        Arc::new(SimulatedReceiver::with_decision(
            DataType::Logs,
            Arc::new(ScriptedDecision::new(outcomes, DecisionOutcome::Success)),
        ))
    }

    async fn started(
        receiver: &Arc<SimulatedReceiver>,
        settings: ExporterConfig,
        mode: RetryMode,
    ) -> Arc<dyn Exporter> {
        let exporter = RetryingExporterFactory::new(mode)
            .create(&settings, DataType::Logs, Endpoint::Local(receiver.clone()))
            .unwrap();
        exporter.start().await.unwrap();
        exporter
    }

    fn item(id: &str) -> TelemetryBatch {
        TelemetryBatch::with_id(DataType::Logs, &UniqueId::from(id))
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_accepted() {
        let receiver = scripted(vec![DecisionOutcome::TransientFailure; 3]);
        let exporter = started(&receiver, fast_settings(), RetryMode::Compliant).await;

        exporter.consume(item("0")).await.unwrap();
        let counters = receiver.counters();
        assert_eq!(counters.requests, 4);
        assert_eq!(counters.transient_failures, 3);
        assert_eq!(receiver.snapshot().accepted, IdSet::from_iter(["0"]));
    }

    #[tokio::test]
    async fn permanent_failure_is_not_resent() {
        let receiver = scripted(vec![DecisionOutcome::PermanentFailure]);
        let exporter = started(&receiver, fast_settings(), RetryMode::Compliant).await;

        let err = exporter.consume(item("0")).await.unwrap_err();
        assert!(matches!(err, ExportError::Permanent(Status { code: StatusCode::Internal, .. })));
        assert_eq!(receiver.counters().requests, 1);
        assert_eq!(receiver.snapshot().dropped, IdSet::from_iter(["0"]));
    }

    #[tokio::test]
    async fn resend_permanent_mode_creates_a_duplicate_resolution() {
        let receiver = scripted(vec![DecisionOutcome::PermanentFailure]);
        let exporter = started(&receiver, fast_settings(), RetryMode::ResendPermanent).await;

        exporter.consume(item("0")).await.unwrap();
        let snapshot = receiver.snapshot();
        assert_eq!(snapshot.counters.requests, 2);
        assert_eq!(snapshot.duplicate_resolutions, IdSet::from_iter(["0"]));
    }

    #[tokio::test]
    async fn never_retry_mode_gives_up_after_one_attempt() {
        let receiver = scripted(vec![DecisionOutcome::TransientFailure]);
        let exporter = started(&receiver, fast_settings(), RetryMode::NeverRetry).await;

        let err = exporter.consume(item("0")).await.unwrap_err();
        assert!(matches!(err, ExportError::RetriesExhausted { attempts: 1, .. }));
        assert!(receiver.snapshot().accepted.is_empty());
    }

    #[tokio::test]
    async fn retry_budget_bounds_the_resend_loop() {
        let receiver = Arc::new(SimulatedReceiver::with_decision(
            DataType::Logs,
            Arc::new(|_: &IdSet| DecisionOutcome::TransientFailure),
        ));
        let mut settings = fast_settings();
        settings.retry.max_elapsed_ms = 30;
        let exporter = started(&receiver, settings, RetryMode::Compliant).await;

        let err = exporter.consume(item("0")).await.unwrap_err();
        assert!(matches!(err, ExportError::RetriesExhausted { .. }));
        assert!(receiver.counters().requests > 1);
    }

    #[tokio::test]
    async fn lifecycle_is_enforced() {
        let receiver = scripted(vec![]);
        let exporter = RetryingExporterFactory::default()
            .create(&fast_settings(), DataType::Logs, Endpoint::Local(receiver.clone()))
            .unwrap();
        assert_eq!(exporter.consume(item("0")).await, Err(ExportError::NotStarted));

        exporter.start().await.unwrap();
        exporter.shutdown().await.unwrap();
        assert_eq!(exporter.consume(item("0")).await, Err(ExportError::ShutDown));
        assert_eq!(exporter.start().await, Err(ExportError::ShutDown));
    }

    #[test]
    fn modes_parse_with_either_separator() {
        assert_eq!(
            "resend-permanent".parse::<RetryMode>(),
            Ok(RetryMode::ResendPermanent)
        );
        assert_eq!("never_retry".parse::<RetryMode>(), Ok(RetryMode::NeverRetry));
        assert!("sometimes".parse::<RetryMode>().is_err());
    }

    #[test]
    fn zero_timeout_is_refused_by_the_factory() {
        let mut settings = ExporterConfig::default();
        settings.timeout_ms = 0;
        let receiver = scripted(vec![]);
        let result = RetryingExporterFactory::default().create(
            &settings,
            DataType::Logs,
            Endpoint::Local(receiver),
        );
        assert!(matches!(result, Err(HarnessError::Exporter(_))));
    }
}
