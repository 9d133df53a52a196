//! # exportcheck-core
//!
//! Foundation layer of the exporter delivery-contract harness.
//!
//! ### Key Submodules:
//! - `ids`: identifier set algebra used for deduplication and convergence checks
//! - `decision`: decision functions scripting how the simulated receiver answers
//! - `signal`: telemetry payload kinds and per-kind id extraction
//! - `error`: validation errors and contract violations

pub mod decision;
pub mod error;
pub mod ids;
pub mod signal;

pub mod prelude {
    pub use crate::decision::*;
    pub use crate::error::*;
    pub use crate::ids::*;
    pub use crate::signal::*;
}

pub use decision::{DecisionFunction, DecisionOutcome, ScenarioKind};
pub use error::{ContractViolation, HarnessError, ValidationError};
pub use ids::{IdSet, SetDiff, UniqueId};
pub use signal::{BatchIds, DataType, TelemetryBatch, UNIQUE_ID_ATTR};
