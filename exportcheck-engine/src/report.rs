//! Per-scenario results and the report for a whole contract check.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use exportcheck_core::{
    ContractViolation, DataType, HarnessError, IdSet, ScenarioKind, UniqueId,
};
use exportcheck_simulator::{GenerationReport, ReceiverSnapshot, RequestCounters};

/// Failure classes a scenario can end with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    DuplicateGeneration,
    DuplicateResolution,
    NonConvergence,
    Exporter,
    Transport,
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioFailure {
    pub kind: FailureKind,
    pub message: String,
    /// The harness broke its own invariants; the exporter is not to blame.
    pub harness_bug: bool,
}

impl From<&HarnessError> for ScenarioFailure {
    fn from(error: &HarnessError) -> Self {
        let kind = match error {
            HarnessError::Validation(_) => FailureKind::Validation,
            HarnessError::Violation(ContractViolation::DuplicateGeneration { .. }) => {
                FailureKind::DuplicateGeneration
            }
            HarnessError::Violation(ContractViolation::DuplicateResolution { .. }) => {
                FailureKind::DuplicateResolution
            }
            HarnessError::Violation(ContractViolation::NonConvergence { .. }) => {
                FailureKind::NonConvergence
            }
            HarnessError::Exporter(_) => FailureKind::Exporter,
            HarnessError::Transport(_) => FailureKind::Transport,
            HarnessError::Cancelled => FailureKind::Cancelled,
        };
        Self {
            kind,
            message: error.to_string(),
            harness_bug: error.is_harness_bug(),
        }
    }
}

/// Outcome of one scenario. Built once the scenario ends and not changed afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario: ScenarioKind,
    pub data_type: DataType,
    pub generated: IdSet,
    pub accepted: IdSet,
    pub dropped: IdSet,
    pub duplicates: Vec<UniqueId>,
    pub counters: RequestCounters,
    /// `consume` calls the exporter answered with an error.
    pub rejected_consumes: u64,
    pub elapsed_ms: u64,
    /// Fingerprint of the generated set, stable across seeded runs.
    pub fingerprint: String,
    pub failure: Option<ScenarioFailure>,
}

impl ScenarioResult {
    pub(crate) fn new(
        scenario: ScenarioKind,
        data_type: DataType,
        generation: GenerationReport,
        snapshot: ReceiverSnapshot,
        elapsed: Duration,
        error: Option<&HarnessError>,
    ) -> Self {
        let duplicates = match error {
            Some(HarnessError::Violation(
                ContractViolation::DuplicateGeneration { ids }
                | ContractViolation::DuplicateResolution { ids },
            )) => ids.clone(),
            _ => Vec::new(),
        };
        Self {
            scenario,
            data_type,
            fingerprint: generation.generated.fingerprint(),
            generated: generation.generated,
            accepted: snapshot.accepted,
            dropped: snapshot.dropped,
            duplicates,
            counters: snapshot.counters,
            rejected_consumes: generation.rejected,
            elapsed_ms: elapsed.as_millis() as u64,
            failure: error.map(ScenarioFailure::from),
        }
    }

    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }
}

impl fmt::Display for ScenarioResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<18} {:<4} requests={} accepted={} dropped={} transient={} permanent={} elapsed={}ms",
            self.scenario.name(),
            if self.passed() { "PASS" } else { "FAIL" },
            self.counters.requests,
            self.accepted.len(),
            self.dropped.len(),
            self.counters.transient_failures,
            self.counters.permanent_failures,
            self.elapsed_ms,
        )?;
        if let Some(failure) = &self.failure {
            write!(f, "\n    {}", failure.message)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContractReport {
    pub started_at: DateTime<Utc>,
    pub data_type: DataType,
    pub results: Vec<ScenarioResult>,
}

impl ContractReport {
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(ScenarioResult::passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ScenarioResult> {
        self.results.iter().filter(|result| !result.passed())
    }

    pub fn result(&self, scenario: ScenarioKind) -> Option<&ScenarioResult> {
        self.results.iter().find(|result| result.scenario == scenario)
    }

    /// Panics with every failed scenario's diagnostics.
    #[track_caller]
    pub fn assert_all_passed(&self) {
        if self.all_passed() {
            return;
        }
        let details: Vec<String> = self.failures().map(ToString::to_string).collect();
        panic!(
            "{} of {} {} scenarios failed:\n{}",
            details.len(),
            self.results.len(),
            self.data_type,
            details.join("\n")
        );
    }
}
