//! ## exportcheck-telemetry::metrics
//! **Prometheus counters for delivery attempts and scenario outcomes**

use prometheus::{Counter, CounterVec, Histogram, HistogramOpts, Opts, Registry};

/// Totals accumulated across every scenario of a run.
#[derive(Debug, Clone)]
pub struct ScenarioTotals {
    pub requests: u64,
    pub accepted_items: u64,
    pub dropped_items: u64,
    pub transient_errors: u64,
    pub permanent_errors: u64,
    pub passed: bool,
    pub elapsed_secs: f64,
}

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub requests: Counter,
    pub accepted_items: Counter,
    pub dropped_items: Counter,
    pub transient_errors: Counter,
    pub permanent_errors: Counter,
    pub scenarios: CounterVec,
    pub convergence_seconds: Histogram,
}

impl MetricsRecorder {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let requests = Counter::new(
            "exportcheck_requests_total",
            "Delivery attempts seen by the simulated receiver",
        )?;
        let accepted_items = Counter::new(
            "exportcheck_accepted_items_total",
            "Items acknowledged by the simulated receiver",
        )?;
        let dropped_items = Counter::new(
            "exportcheck_dropped_items_total",
            "Items rejected with a permanent failure",
        )?;
        let transient_errors = Counter::new(
            "exportcheck_transient_errors_total",
            "Injected retryable failures",
        )?;
        let permanent_errors = Counter::new(
            "exportcheck_permanent_errors_total",
            "Injected terminal failures",
        )?;
        let scenarios = CounterVec::new(
            Opts::new("exportcheck_scenarios_total", "Completed scenarios by outcome"),
            &["outcome"],
        )?;
        let convergence_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "exportcheck_convergence_seconds",
                "Time from first submission to convergence",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(accepted_items.clone()))?;
        registry.register(Box::new(dropped_items.clone()))?;
        registry.register(Box::new(transient_errors.clone()))?;
        registry.register(Box::new(permanent_errors.clone()))?;
        registry.register(Box::new(scenarios.clone()))?;
        registry.register(Box::new(convergence_seconds.clone()))?;

        Ok(Self {
            registry,
            requests,
            accepted_items,
            dropped_items,
            transient_errors,
            permanent_errors,
            scenarios,
            convergence_seconds,
        })
    }

    /// Adds one finished scenario.
    pub fn record_scenario(&self, totals: &ScenarioTotals) {
        self.requests.inc_by(totals.requests as f64);
        self.accepted_items.inc_by(totals.accepted_items as f64);
        self.dropped_items.inc_by(totals.dropped_items as f64);
        self.transient_errors.inc_by(totals.transient_errors as f64);
        self.permanent_errors.inc_by(totals.permanent_errors as f64);
        let outcome = if totals.passed { "passed" } else { "failed" };
        self.scenarios.with_label_values(&[outcome]).inc();
        if totals.passed {
            self.convergence_seconds.observe(totals.elapsed_secs);
        }
    }

    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
