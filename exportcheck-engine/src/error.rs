use thiserror::Error;
use tokio::task::JoinError;

use exportcheck_config::ConfigError;
use exportcheck_core::HarnessError;

/// Errors that stop a whole contract check. Per-scenario findings are
/// reported in the [`crate::ContractReport`] instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Harness error: {0}")]
    Harness(#[from] HarnessError),

    #[error("Background task failed: {0}")]
    Join(#[from] JoinError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Report serialization failed: {0}")]
    Report(#[from] serde_yaml::Error),
}
