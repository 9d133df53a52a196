//! # Simulated Receiver
//!
//! The downstream endpoint an exporter under test talks to. Every inbound
//! batch is validated, judged once by the active decision function and then
//! recorded as accepted, dropped or neither (transient failure).
//!
//! One receiver serves all three data types; only the expected
//! [`DataType`] tag differs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use exportcheck_core::decision::AlwaysSucceed;
use exportcheck_core::{
    BatchIds, DataType, DecisionFunction, DecisionOutcome, IdSet, TelemetryBatch, UniqueId,
    ValidationError,
};

use crate::transport::{ExportService, Status};

/// Aggregate counts kept by the receiver. Cleared only by [`SimulatedReceiver::reset`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestCounters {
    /// Every inbound call, including rejected ones.
    pub requests: u64,
    pub successes: u64,
    pub transient_failures: u64,
    pub permanent_failures: u64,
    /// Items in successfully acknowledged calls.
    pub accepted_items: u64,
    /// Items in permanently rejected calls.
    pub dropped_items: u64,
    pub validation_failures: u64,
}

impl RequestCounters {
    pub fn total_errors(&self) -> u64 {
        self.transient_failures + self.permanent_failures + self.validation_failures
    }
}

/// Point-in-time copy of everything the receiver recorded.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReceiverSnapshot {
    pub counters: RequestCounters,
    pub accepted: IdSet,
    pub dropped: IdSet,
    /// Ids resolved a second time: accepted twice, dropped twice, or both.
    pub duplicate_resolutions: IdSet,
    /// First validation failure seen, if any.
    pub validation_error: Option<ValidationError>,
}

#[derive(Default)]
struct ReceiverState {
    counters: RequestCounters,
    accepted: IdSet,
    dropped: IdSet,
    duplicate_resolutions: IdSet,
    attempts: HashMap<UniqueId, Vec<DecisionOutcome>>,
    last_request: Option<TelemetryBatch>,
    validation_error: Option<ValidationError>,
}

impl ReceiverState {
    fn resolve(&mut self, batch: &BatchIds, outcome: DecisionOutcome) {
        if outcome == DecisionOutcome::TransientFailure {
            return;
        }
        // A repeat inside one batch resolves the same item twice.
        for id in &batch.repeated {
            self.duplicate_resolutions.insert(id.clone());
        }
        for id in &batch.ids {
            let first = match outcome {
                DecisionOutcome::Success => {
                    self.accepted.insert(id.clone()) && !self.dropped.contains(id)
                }
                DecisionOutcome::PermanentFailure => {
                    self.dropped.insert(id.clone()) && !self.accepted.contains(id)
                }
                DecisionOutcome::TransientFailure => true,
            };
            if !first {
                self.duplicate_resolutions.insert(id.clone());
            }
        }
    }
}

pub struct SimulatedReceiver {
    data_type: DataType,
    decision: RwLock<Arc<dyn DecisionFunction>>,
    state: RwLock<ReceiverState>,
}

impl SimulatedReceiver {
    /// Starts out accepting everything.
    pub fn new(data_type: DataType) -> Self {
        Self::with_decision(data_type, Arc::new(AlwaysSucceed))
    }

    pub fn with_decision(data_type: DataType, decision: Arc<dyn DecisionFunction>) -> Self {
        Self {
            data_type,
            decision: RwLock::new(decision),
            state: RwLock::new(ReceiverState::default()),
        }
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Installs the decision function consulted for subsequent calls.
    pub fn set_decision(&self, decision: Arc<dyn DecisionFunction>) {
        *self.decision.write() = decision;
    }

    /// Clears counters, sets and history. The decision function is kept.
    pub fn reset(&self) {
        *self.state.write() = ReceiverState::default();
    }

    /// Handles one delivery attempt.
    pub fn handle(&self, batch: TelemetryBatch) -> Result<(), Status> {
        let batch_ids = match self.validate(&batch) {
            Ok(batch_ids) => batch_ids,
            Err(err) => {
                error!(error = %err, "Rejecting malformed batch");
                let mut state = self.state.write();
                state.counters.requests += 1;
                state.counters.validation_failures += 1;
                state.validation_error.get_or_insert(err.clone());
                state.last_request = Some(batch);
                return Err(Status::invalid_argument(err.to_string()));
            }
        };

        // The decision function runs outside of any receiver lock.
        let decision = self.decision.read().clone();
        let ids = &batch_ids.ids;
        let outcome = decision.decide(ids);
        let items = batch.item_count() as u64;

        let mut state = self.state.write();
        state.counters.requests += 1;
        for id in ids {
            state.attempts.entry(id.clone()).or_default().push(outcome);
        }
        state.resolve(&batch_ids, outcome);
        state.last_request = Some(batch);

        match outcome {
            DecisionOutcome::Success => {
                state.counters.successes += 1;
                state.counters.accepted_items += items;
                trace!(ids = ?ids, "Accepted");
                Ok(())
            }
            DecisionOutcome::TransientFailure => {
                state.counters.transient_failures += 1;
                debug!(ids = ?ids, "Transient failure injected, expecting retry");
                Err(Status::deadline_exceeded("transient failure injected"))
            }
            DecisionOutcome::PermanentFailure => {
                state.counters.permanent_failures += 1;
                state.counters.dropped_items += items;
                debug!(ids = ?ids, "Permanent failure injected, dropping");
                Err(Status::internal("permanent failure injected"))
            }
        }
    }

    fn validate(&self, batch: &TelemetryBatch) -> Result<BatchIds, ValidationError> {
        if batch.data_type() != self.data_type {
            return Err(ValidationError::UnexpectedDataType {
                expected: self.data_type,
                found: batch.data_type(),
            });
        }
        batch.batch_ids()
    }

    pub fn snapshot(&self) -> ReceiverSnapshot {
        let state = self.state.read();
        ReceiverSnapshot {
            counters: state.counters,
            accepted: state.accepted.clone(),
            dropped: state.dropped.clone(),
            duplicate_resolutions: state.duplicate_resolutions.clone(),
            validation_error: state.validation_error.clone(),
        }
    }

    /// First validation failure seen since the last reset.
    pub fn validation_error(&self) -> Option<ValidationError> {
        self.state.read().validation_error.clone()
    }

    pub fn counters(&self) -> RequestCounters {
        self.state.read().counters
    }

    pub fn last_request(&self) -> Option<TelemetryBatch> {
        self.state.read().last_request.clone()
    }

    /// Outcomes returned for every attempt that carried `id`, oldest first.
    pub fn attempts(&self, id: &UniqueId) -> Vec<DecisionOutcome> {
        self.state
            .read()
            .attempts
            .get(id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ExportService for SimulatedReceiver {
    async fn export(&self, batch: TelemetryBatch) -> Result<(), Status> {
        self.handle(batch)
    }
}
