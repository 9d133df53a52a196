//! Settings handed to the exporter factory.
//!
//! The retry block only configures the reference exporter; exporters under
//! test are free to ignore it and bring their own policy.

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

/// Exporter settings.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct ExporterConfig {
    /// Per-request timeout (milliseconds).
    #[validate(range(min = 1, max = 600_000))]
    #[serde(default = "default_request_timeout_ms")]
    pub timeout_ms: u64,

    /// Resend policy for retryable failures.
    #[validate(nested)]
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_request_timeout_ms(),
            retry: RetryConfig::default(),
        }
    }
}

/// Exponential backoff parameters.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct RetryConfig {
    /// Whether retryable failures are resent at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// First backoff interval (milliseconds).
    #[validate(range(min = 1, max = 60_000))]
    #[serde(default = "default_initial_interval_ms")]
    pub initial_interval_ms: u64,

    /// Growth factor applied after every retry.
    #[validate(range(min = 1.0, max = 10.0))]
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Relative jitter applied to each interval.
    #[validate(range(min = 0.0, max = 1.0))]
    #[serde(default = "default_randomization_factor")]
    pub randomization_factor: f64,

    /// Upper bound for a single interval (milliseconds).
    #[validate(range(min = 1, max = 600_000))]
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,

    /// Total time spent retrying one batch before giving up (milliseconds).
    #[validate(range(min = 1, max = 3_600_000))]
    #[serde(default = "default_max_elapsed_ms")]
    pub max_elapsed_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_initial_interval_ms() -> u64 {
    10
}

fn default_multiplier() -> f64 {
    1.1
}

fn default_randomization_factor() -> f64 {
    0.5
}

fn default_max_interval_ms() -> u64 {
    10_000
}

fn default_max_elapsed_ms() -> u64 {
    60_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            initial_interval_ms: default_initial_interval_ms(),
            multiplier: default_multiplier(),
            randomization_factor: default_randomization_factor(),
            max_interval_ms: default_max_interval_ms(),
            max_elapsed_ms: default_max_elapsed_ms(),
        }
    }
}
