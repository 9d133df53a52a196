//! ## exportcheck-telemetry::logging
//! **Structured logging with tracing and OpenTelemetry key/values**
//!
//! `RUST_LOG` always wins over the configured level.

use opentelemetry::KeyValue;
use tracing::{info_span, Instrument};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Clone)]
pub struct EventLogger;

impl EventLogger {
    /// Installs the global subscriber.
    ///
    /// # Panics
    /// Panics if a global subscriber is already installed; use [`EventLogger::try_init`]
    /// where that can happen.
    pub fn init(default_level: &str) {
        if let Err(e) = Self::try_init(default_level) {
            panic!("Failed to install tracing subscriber: {e}");
        }
    }

    /// Installs the global subscriber unless one is already set.
    pub fn try_init(
        default_level: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
        fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new(default_level)),
            )
            .with_thread_names(true)
            .with_span_events(FmtSpan::ENTER)
            .try_init()
    }

    /// Emits one structured event, e.g. `scenario_complete`, with its metadata.
    #[inline]
    pub async fn log_event(event_type: &str, metadata: Vec<KeyValue>) {
        let span = info_span!(
            "contract_event",
            event_type = event_type,
            otel.kind = "INTERNAL"
        );

        async {
            let fields: Vec<String> = metadata
                .iter()
                .map(|kv| format!("{}={}", kv.key, kv.value))
                .collect();
            tracing::info!(metadata = %fields.join(" "), "Contract event recorded");
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[traced_test]
    #[tokio::test]
    async fn test_logging() {
        EventLogger::log_event(
            "scenario_complete",
            vec![
                KeyValue::new("scenario", "always_succeed"),
                KeyValue::new("accepted", 10),
            ],
        )
        .await;
        assert!(logs_contain("Contract event recorded"));
        assert!(logs_contain("scenario=always_succeed accepted=10"));
    }
}
