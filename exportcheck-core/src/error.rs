use std::time::Duration;

use thiserror::Error;

use crate::ids::UniqueId;
use crate::signal::DataType;

/// An inbound item could not be mapped to a unique id.
///
/// Either the exporter mangled the payload or the harness encoded it wrong;
/// the scenario cannot be judged either way.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid data element, attribute {attribute:?} is missing")]
    MissingAttribute { attribute: &'static str },

    #[error("invalid data element, attribute {attribute:?} is wrong type {found}")]
    WrongAttributeType {
        attribute: &'static str,
        found: &'static str,
    },

    #[error("batch carries no data elements")]
    EmptyBatch,

    #[error("expected {expected} payload, received {found}")]
    UnexpectedDataType { expected: DataType, found: DataType },
}

/// Breach of the exactly-once delivery contract.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ContractViolation {
    /// The generator produced the same id twice. A harness bug.
    #[error("generator produced duplicate ids: {}", format_ids(.ids))]
    DuplicateGeneration { ids: Vec<UniqueId> },

    /// An id was resolved more than once, or ended up both accepted and dropped.
    #[error("ids resolved more than once: {}", format_ids(.ids))]
    DuplicateResolution { ids: Vec<UniqueId> },

    /// Generated and resolved sets did not match before the deadline.
    #[error(
        "no convergence after {waited:?}: {} missing ({}), {} unexpected ({})",
        .missing.len(),
        format_ids(.missing),
        .unexpected.len(),
        format_ids(.unexpected)
    )]
    NonConvergence {
        missing: Vec<UniqueId>,
        unexpected: Vec<UniqueId>,
        waited: Duration,
    },
}

/// Unified harness error type.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum HarnessError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Contract violation: {0}")]
    Violation(#[from] ContractViolation),

    #[error("Exporter error: {0}")]
    Exporter(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Cancelled before convergence")]
    Cancelled,
}

impl HarnessError {
    /// True only for duplicate generation, the one failure the exporter
    /// under test cannot cause.
    pub fn is_harness_bug(&self) -> bool {
        matches!(
            self,
            HarnessError::Violation(ContractViolation::DuplicateGeneration { .. })
        )
    }
}

const MAX_LISTED_IDS: usize = 16;

fn format_ids(ids: &[UniqueId]) -> String {
    let mut listed: Vec<&str> = ids.iter().take(MAX_LISTED_IDS).map(UniqueId::as_str).collect();
    if ids.len() > MAX_LISTED_IDS {
        listed.push("...");
    }
    format!("[{}]", listed.join(", "))
}
