//! # exportcheck Telemetry
//!
//! Logging and metrics shared by the harness crates.

pub mod logging;
pub mod metrics;

pub use logging::EventLogger;
pub use metrics::{MetricsRecorder, ScenarioTotals};
