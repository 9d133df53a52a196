//! # exportcheck Engine
//!
//! Runs the exporter delivery-contract check: for each scenario it resets
//! the simulated receiver, installs a decision function, drives the
//! generator through the exporter and waits for convergence.
//!
//! ```no_run
//! # async fn demo() -> Result<(), exportcheck_engine::EngineError> {
//! use std::sync::Arc;
//! use exportcheck_core::DataType;
//! use exportcheck_engine::{check_consume_contract, CheckParams};
//! use exportcheck_simulator::RetryingExporterFactory;
//!
//! let params = CheckParams::new(Arc::new(RetryingExporterFactory::default()), DataType::Logs);
//! check_consume_contract(params).await?.assert_all_passed();
//! # Ok(())
//! # }
//! ```

mod checker;
mod diagnostics;
mod error;
mod report;
mod runner;

pub use checker::{Convergence, ConvergenceChecker, ResolutionSource};
pub use diagnostics::DiagnosticsCollector;
pub use error::EngineError;
pub use report::{ContractReport, FailureKind, ScenarioFailure, ScenarioResult};
pub use runner::{check_consume_contract, CheckParams};

pub mod prelude {
    pub use super::{
        check_consume_contract, CheckParams, ContractReport, EngineError, FailureKind,
        ScenarioResult,
    };
}
