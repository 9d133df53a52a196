//! Simulated receiver placement.

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

/// How the exporter reaches the simulated receiver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Direct calls within the process.
    #[default]
    InProcess,
    /// Length-delimited JSON frames over TCP.
    Tcp,
}

/// Receiver configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct ReceiverConfig {
    #[serde(default)]
    pub transport: TransportKind,

    /// Listen address for the TCP transport. Port 0 picks a free port.
    #[validate(custom(function = validation::validate_endpoint))]
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

fn default_endpoint() -> String {
    "127.0.0.1:0".into()
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            endpoint: default_endpoint(),
        }
    }
}
