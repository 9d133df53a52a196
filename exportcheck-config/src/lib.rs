//! # exportcheck Configuration
//!
//! Hierarchical configuration for the delivery-contract harness.
//!
//! ## Sources (later wins)
//! 1. Built-in defaults
//! 2. `config/exportcheck.yaml`, when present
//! 3. `EXPORTCHECK_*` environment variables (`__` separates nested keys,
//!    e.g. `EXPORTCHECK_RUN__ITEM_COUNT=500`)

#![deny(rustdoc::broken_intra_doc_links)]

use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod error;
mod exporter;
mod receiver;
mod run;
mod telemetry;
mod validation;

pub use error::ConfigError;
pub use exporter::{ExporterConfig, RetryConfig};
pub use receiver::{ReceiverConfig, TransportKind};
pub use run::RunConfig;
pub use telemetry::TelemetryConfig;

const DEFAULT_CONFIG_PATH: &str = "config/exportcheck.yaml";
const ENV_PREFIX: &str = "EXPORTCHECK_";

/// Top-level configuration container.
#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone, PartialEq)]
pub struct ExportCheckConfig {
    /// What to generate and how long to wait for convergence.
    #[validate(nested)]
    #[serde(default)]
    pub run: RunConfig,

    /// Settings handed to the exporter factory.
    #[validate(nested)]
    #[serde(default)]
    pub exporter: ExporterConfig,

    /// Where the simulated receiver listens.
    #[validate(nested)]
    #[serde(default)]
    pub receiver: ReceiverConfig,

    /// Logging and metrics.
    #[validate(nested)]
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl ExportCheckConfig {
    /// Load configuration from the default file (if any) and environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(ExportCheckConfig::default()));
        if Path::new(DEFAULT_CONFIG_PATH).exists() {
            figment = figment.merge(Yaml::file(DEFAULT_CONFIG_PATH));
        }
        Self::extract(figment)
    }

    /// Load configuration from a specific file, which must exist.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let figment = Figment::from(Serialized::defaults(ExportCheckConfig::default()))
            .merge(Yaml::file(path));
        Self::extract(figment)
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.check()?;
        Ok(config)
    }

    /// Field validation plus cross-field rules.
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()?;
        if self.run.poll_interval_ms >= self.run.timeout_ms {
            return Err(ConfigError::Invalid(format!(
                "run.poll_interval_ms ({}) must be below run.timeout_ms ({})",
                self.run.poll_interval_ms, self.run.timeout_ms
            )));
        }
        if self.exporter.retry.initial_interval_ms > self.exporter.retry.max_interval_ms {
            return Err(ConfigError::Invalid(
                "exporter.retry.initial_interval_ms exceeds max_interval_ms".into(),
            ));
        }
        Ok(())
    }
}

impl RunConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
