//! # Convergence Checker
//!
//! Polls the receiver until every generated id is resolved exactly once, or
//! the deadline passes. Polling tolerates any retry schedule the exporter
//! chooses; the deadline turns a stuck exporter into a reported failure.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

use exportcheck_core::{ContractViolation, HarnessError, IdSet, UniqueId};
use exportcheck_simulator::{ReceiverSnapshot, SimulatedReceiver};

/// Where the checker reads resolved ids from.
pub trait ResolutionSource: Send + Sync {
    fn snapshot(&self) -> ReceiverSnapshot;
}

impl ResolutionSource for SimulatedReceiver {
    fn snapshot(&self) -> ReceiverSnapshot {
        SimulatedReceiver::snapshot(self)
    }
}

impl<T: ResolutionSource + ?Sized> ResolutionSource for Arc<T> {
    fn snapshot(&self) -> ReceiverSnapshot {
        (**self).snapshot()
    }
}

/// Receiver state at the moment of convergence.
#[derive(Clone, Debug)]
pub struct Convergence {
    pub snapshot: ReceiverSnapshot,
    pub waited: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct ConvergenceChecker {
    poll_interval: Duration,
    timeout: Duration,
}

impl ConvergenceChecker {
    pub fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            poll_interval,
            timeout,
        }
    }

    /// Waits until accepted ∪ dropped equals `generated`.
    ///
    /// Fails fast on validation errors and on any id resolved twice. On
    /// timeout the last observed difference is returned as
    /// [`ContractViolation::NonConvergence`].
    #[instrument(skip_all, fields(generated = generated.len()))]
    pub async fn wait<R: ResolutionSource + ?Sized>(
        &self,
        generated: &IdSet,
        receiver: &R,
        cancel: &CancellationToken,
    ) -> Result<Convergence, HarnessError> {
        let started = Instant::now();
        loop {
            let snapshot = receiver.snapshot();
            let resolved = Self::resolved(&snapshot)?;
            let diff = generated.compare(&resolved);

            if diff.is_empty() {
                // Late resends may land between the two snapshots.
                let snapshot = receiver.snapshot();
                Self::resolved(&snapshot)?;
                let waited = started.elapsed();
                debug!(?waited, "Converged");
                return Ok(Convergence { snapshot, waited });
            }

            let waited = started.elapsed();
            if waited >= self.timeout {
                return Err(ContractViolation::NonConvergence {
                    missing: diff.missing_in_other,
                    unexpected: diff.only_in_other,
                    waited,
                }
                .into());
            }
            trace!(
                missing = diff.missing_in_other.len(),
                unexpected = diff.only_in_other.len(),
                "Not converged yet"
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(HarnessError::Cancelled),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    /// Union of accepted and dropped, after the duplicate checks.
    fn resolved(snapshot: &ReceiverSnapshot) -> Result<IdSet, HarnessError> {
        if let Some(err) = &snapshot.validation_error {
            return Err(err.clone().into());
        }

        let (resolved, overlap) = snapshot.accepted.union(&snapshot.dropped);
        let mut duplicates: IdSet = overlap.into_iter().collect();
        duplicates.extend(snapshot.duplicate_resolutions.iter().cloned());
        if !duplicates.is_empty() {
            let ids: Vec<UniqueId> = duplicates.into_iter().collect();
            return Err(ContractViolation::DuplicateResolution { ids }.into());
        }
        Ok(resolved)
    }
}
