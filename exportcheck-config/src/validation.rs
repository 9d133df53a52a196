//! Custom validation functions for configuration.

use std::net::SocketAddr;

use exportcheck_core::ScenarioKind;
use validator::ValidationError;

/// Validate that an endpoint parses as a socket address.
pub fn validate_endpoint(endpoint: &str) -> Result<(), ValidationError> {
    endpoint
        .parse::<SocketAddr>()
        .map(|_| ())
        .map_err(|_| ValidationError::new("invalid_endpoint"))
}

/// Validate log level.
pub fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid = ["trace", "debug", "info", "warn", "error"].contains(&level.to_lowercase().as_str());
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_log_level"))
    }
}

/// Validate that at least one scenario is selected and none repeats.
pub fn validate_scenarios(scenarios: &[ScenarioKind]) -> Result<(), ValidationError> {
    if scenarios.is_empty() {
        return Err(ValidationError::new("no_scenarios"));
    }
    for (i, kind) in scenarios.iter().enumerate() {
        if scenarios[..i].contains(kind) {
            return Err(ValidationError::new("duplicate_scenario"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints() {
        assert!(validate_endpoint("127.0.0.1:4317").is_ok());
        assert!(validate_endpoint("localhost").is_err());
    }

    #[test]
    fn log_levels() {
        assert!(validate_log_level("DEBUG").is_ok());
        assert!(validate_log_level("verbose").is_err());
    }

    #[test]
    fn scenarios() {
        assert!(validate_scenarios(&ScenarioKind::ALL).is_ok());
        assert!(validate_scenarios(&[]).is_err());
        assert!(validate_scenarios(&[ScenarioKind::RandomMixed, ScenarioKind::RandomMixed]).is_err());
    }
}
