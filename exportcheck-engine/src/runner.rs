//! # Scenario Runner
//!
//! Single entry point of the harness. Scenarios run one after another
//! against one bound receiver; each gets a fresh exporter and a reset
//! receiver, and a failing scenario never stops the ones after it.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use opentelemetry::KeyValue;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use exportcheck_config::{
    ConfigError, ExportCheckConfig, ExporterConfig, RunConfig, TransportKind,
};
use exportcheck_core::{DataType, HarnessError, ScenarioKind, ValidationError};
use exportcheck_simulator::{
    ConcurrentGenerator, Endpoint, Exporter, ExporterFactory, GenerationReport, InProcessBinding,
    ReceiverBinding, ReceiverSnapshot, SimulatedReceiver, TcpBinding,
};
use exportcheck_telemetry::{EventLogger, MetricsRecorder, ScenarioTotals};

use crate::checker::ConvergenceChecker;
use crate::diagnostics::DiagnosticsCollector;
use crate::error::EngineError;
use crate::report::{ContractReport, ScenarioResult};

/// Everything one contract check needs.
#[derive(Clone)]
pub struct CheckParams {
    pub exporter_factory: Arc<dyn ExporterFactory>,
    pub data_type: DataType,
    pub exporter_config: ExporterConfig,
    pub item_count: usize,
    pub workers: usize,
    pub receiver_binding: Arc<dyn ReceiverBinding>,
    pub poll_interval: Duration,
    pub timeout: Duration,
    /// Seeds every randomized decision function; scenario `i` uses `seed + i`.
    pub seed: Option<u64>,
    pub scenarios: Vec<ScenarioKind>,
    /// Failed scenarios are written here as YAML when set.
    pub report_dir: Option<PathBuf>,
    pub metrics: Option<Arc<MetricsRecorder>>,
    pub cancel: CancellationToken,
}

impl CheckParams {
    /// Default run settings, in-process transport.
    pub fn new(exporter_factory: Arc<dyn ExporterFactory>, data_type: DataType) -> Self {
        let run = RunConfig::default();
        Self {
            exporter_factory,
            data_type,
            exporter_config: ExporterConfig::default(),
            item_count: run.item_count,
            workers: run.workers,
            receiver_binding: Arc::new(InProcessBinding),
            poll_interval: run.poll_interval(),
            timeout: run.timeout(),
            seed: run.seed,
            scenarios: run.scenarios,
            report_dir: None,
            metrics: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn from_config(
        config: &ExportCheckConfig,
        exporter_factory: Arc<dyn ExporterFactory>,
    ) -> Result<Self, EngineError> {
        config.check()?;
        let receiver_binding: Arc<dyn ReceiverBinding> = match config.receiver.transport {
            TransportKind::InProcess => Arc::new(InProcessBinding),
            TransportKind::Tcp => {
                let addr: SocketAddr = config.receiver.endpoint.parse().map_err(|e| {
                    ConfigError::Invalid(format!(
                        "receiver.endpoint '{}': {e}",
                        config.receiver.endpoint
                    ))
                })?;
                Arc::new(TcpBinding::new(addr))
            }
        };

        Ok(Self {
            exporter_factory,
            data_type: config.run.data_type,
            exporter_config: config.exporter.clone(),
            item_count: config.run.item_count,
            workers: config.run.workers,
            receiver_binding,
            poll_interval: config.run.poll_interval(),
            timeout: config.run.timeout(),
            seed: config.run.seed,
            scenarios: config.run.scenarios.clone(),
            report_dir: None,
            metrics: None,
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_item_count(mut self, item_count: usize) -> Self {
        self.item_count = item_count;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_scenarios(mut self, scenarios: impl IntoIterator<Item = ScenarioKind>) -> Self {
        self.scenarios = scenarios.into_iter().collect();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_receiver_binding(mut self, binding: Arc<dyn ReceiverBinding>) -> Self {
        self.receiver_binding = binding;
        self
    }

    pub fn with_exporter_config(mut self, exporter_config: ExporterConfig) -> Self {
        self.exporter_config = exporter_config;
        self
    }

    pub fn with_timing(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.timeout = timeout;
        self
    }

    pub fn with_report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.report_dir = Some(dir.into());
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Runs every configured scenario and reports pass/fail with counters.
///
/// Only infrastructure problems (binding or shutting down the receiver)
/// return `Err`; contract findings land in the report. A failure report that
/// cannot be written is logged and the run goes on.
#[instrument(skip_all, fields(data_type = %params.data_type, items = params.item_count))]
pub async fn check_consume_contract(params: CheckParams) -> Result<ContractReport, EngineError> {
    let started_at = Utc::now();
    let receiver = Arc::new(SimulatedReceiver::new(params.data_type));
    let bound = params.receiver_binding.bind(receiver.clone()).await?;
    info!(
        endpoint = %bound.endpoint(),
        scenarios = params.scenarios.len(),
        "Starting contract check"
    );

    let mut diagnostics = params.report_dir.as_ref().map(DiagnosticsCollector::new);
    let mut results = Vec::with_capacity(params.scenarios.len());

    for (index, scenario) in params.scenarios.iter().copied().enumerate() {
        let result = if params.cancel.is_cancelled() {
            ScenarioResult::new(
                scenario,
                params.data_type,
                GenerationReport::default(),
                ReceiverSnapshot::default(),
                Duration::ZERO,
                Some(&HarnessError::Cancelled),
            )
        } else {
            let seed = params.seed.map(|seed| seed.wrapping_add(index as u64));
            run_scenario(&params, scenario, seed, &receiver, bound.endpoint()).await
        };

        record(&params, &result).await;
        if let (Some(collector), false) = (diagnostics.as_mut(), result.passed()) {
            if let Err(error) = collector.record_failure(started_at, &result) {
                warn!(%error, scenario = %result.scenario, "Failed to write failure report");
            }
        }
        results.push(result);
    }

    bound.shutdown().await?;

    let report = ContractReport {
        started_at,
        data_type: params.data_type,
        results,
    };
    info!(
        passed = report.all_passed(),
        failed = report.failures().count(),
        "Contract check finished"
    );
    Ok(report)
}

#[instrument(skip_all, fields(scenario = %scenario))]
async fn run_scenario(
    params: &CheckParams,
    scenario: ScenarioKind,
    seed: Option<u64>,
    receiver: &SimulatedReceiver,
    endpoint: &Endpoint,
) -> ScenarioResult {
    receiver.reset();
    receiver.set_decision(scenario.decision(seed));

    let started = Instant::now();
    let mut generation = GenerationReport::default();
    let error = execute(params, receiver, endpoint, &mut generation).await.err();
    if let Some(error) = &error {
        warn!(%error, "Scenario failed");
    }

    ScenarioResult::new(
        scenario,
        params.data_type,
        generation,
        receiver.snapshot(),
        started.elapsed(),
        error.as_ref(),
    )
}

async fn execute(
    params: &CheckParams,
    receiver: &SimulatedReceiver,
    endpoint: &Endpoint,
    generation: &mut GenerationReport,
) -> Result<(), HarnessError> {
    let exporter = params.exporter_factory.create(
        &params.exporter_config,
        params.data_type,
        endpoint.clone(),
    )?;
    exporter
        .start()
        .await
        .map_err(|e| HarnessError::Exporter(format!("start failed: {e}")))?;

    let outcome = generate_and_converge(params, receiver, &exporter, generation).await;

    if let Err(e) = exporter.shutdown().await {
        warn!(error = %e, "Exporter shutdown failed");
    }
    outcome
}

async fn generate_and_converge(
    params: &CheckParams,
    receiver: &SimulatedReceiver,
    exporter: &Arc<dyn Exporter>,
    generation: &mut GenerationReport,
) -> Result<(), HarnessError> {
    let stop = params.cancel.child_token();
    let generator =
        ConcurrentGenerator::new(params.data_type, params.item_count as u64, params.workers)
            .with_cancellation(stop.clone());

    // A malformed batch makes the scenario unjudgeable, so generation stops
    // as soon as the receiver sees one.
    let run = generator.run(exporter.clone());
    tokio::pin!(run);
    *generation = tokio::select! {
        report = &mut run => report?,
        error = first_validation_error(receiver, params.poll_interval) => {
            stop.cancel();
            // Workers finish their in-flight item before stopping.
            let _ = run.await;
            return Err(error.into());
        }
    };
    if params.cancel.is_cancelled() {
        return Err(HarnessError::Cancelled);
    }

    ConvergenceChecker::new(params.poll_interval, params.timeout)
        .wait(&generation.generated, receiver, &params.cancel)
        .await?;
    Ok(())
}

async fn first_validation_error(
    receiver: &SimulatedReceiver,
    poll_interval: Duration,
) -> ValidationError {
    loop {
        if let Some(error) = receiver.validation_error() {
            return error;
        }
        tokio::time::sleep(poll_interval).await;
    }
}

async fn record(params: &CheckParams, result: &ScenarioResult) {
    if let Some(metrics) = &params.metrics {
        metrics.record_scenario(&ScenarioTotals {
            requests: result.counters.requests,
            accepted_items: result.counters.accepted_items,
            dropped_items: result.counters.dropped_items,
            transient_errors: result.counters.transient_failures,
            permanent_errors: result.counters.permanent_failures,
            passed: result.passed(),
            elapsed_secs: result.elapsed().as_secs_f64(),
        });
    }

    EventLogger::log_event(
        "scenario_complete",
        vec![
            KeyValue::new("scenario", result.scenario.name()),
            KeyValue::new("data_type", result.data_type.name()),
            KeyValue::new("passed", result.passed()),
            KeyValue::new("requests", result.counters.requests as i64),
            KeyValue::new("accepted", result.accepted.len() as i64),
            KeyValue::new("dropped", result.dropped.len() as i64),
            KeyValue::new("transient_errors", result.counters.transient_failures as i64),
        ],
    )
    .await;
}
