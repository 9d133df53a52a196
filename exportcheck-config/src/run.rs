//! Scenario run parameters.
//!
//! Controls what is generated and how long the convergence wait may take:
//! - Item count and worker parallelism
//! - Scenario selection and seeding
//! - Polling interval and timeout

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use exportcheck_core::{DataType, ScenarioKind};

use crate::validation;

/// Parameters of one contract check run.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct RunConfig {
    /// Payload kind exercised through the exporter.
    #[serde(default)]
    pub data_type: DataType,

    /// Items generated per scenario.
    #[validate(range(min = 1, max = 1_000_000))]
    #[serde(default = "default_item_count")]
    pub item_count: usize,

    /// Parallel generator workers.
    #[validate(range(min = 1, max = 256))]
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Seed for randomized decision functions; entropy when absent.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Scenarios to run, in order.
    #[validate(custom(function = validation::validate_scenarios))]
    #[serde(default = "default_scenarios")]
    pub scenarios: Vec<ScenarioKind>,

    /// Convergence polling interval (milliseconds).
    #[validate(range(min = 1, max = 10_000))]
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Convergence timeout (milliseconds).
    #[validate(range(min = 10, max = 600_000))]
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_item_count() -> usize {
    100
}

fn default_workers() -> usize {
    num_cpus::get().clamp(1, 8)
}

fn default_scenarios() -> Vec<ScenarioKind> {
    ScenarioKind::ALL.to_vec()
}

fn default_poll_interval_ms() -> u64 {
    10
}

fn default_timeout_ms() -> u64 {
    5_000
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            data_type: DataType::default(),
            item_count: default_item_count(),
            workers: default_workers(),
            seed: None,
            scenarios: default_scenarios(),
            poll_interval_ms: default_poll_interval_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }
}
