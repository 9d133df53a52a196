use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use exportcheck_config::ExporterConfig;
use exportcheck_core::decision::{PermanentForIds, TransientForIds};
use exportcheck_core::{
    DataType, DecisionOutcome, HarnessError, IdSet, ScenarioKind, TelemetryBatch, UniqueId,
    UNIQUE_ID_ATTR,
};
use exportcheck_engine::{
    check_consume_contract, CheckParams, ConvergenceChecker, FailureKind,
};
use exportcheck_simulator::{
    ConcurrentGenerator, Endpoint, ExportClient, ExportError, Exporter, ExporterFactory,
    RetryMode, RetryingExporterFactory, SimulatedReceiver, TcpBinding,
};
use exportcheck_telemetry::MetricsRecorder;
use tokio_util::sync::CancellationToken;

fn fast_exporter_config() -> ExporterConfig {
    let mut config = ExporterConfig::default();
    config.timeout_ms = 1_000;
    config.retry.initial_interval_ms = 1;
    config.retry.max_interval_ms = 20;
    config.retry.max_elapsed_ms = 4_000;
    config
}

fn params(mode: RetryMode, data_type: DataType) -> CheckParams {
    CheckParams::new(Arc::new(RetryingExporterFactory::new(mode)), data_type)
        .with_item_count(10)
        .with_workers(2)
        .with_seed(42)
        .with_exporter_config(fast_exporter_config())
        .with_timing(Duration::from_millis(10), Duration::from_secs(5))
}

fn sequence(range: std::ops::Range<u64>) -> IdSet {
    range.map(UniqueId::from_sequence).collect()
}

/// Ten items, one worker, through the reference exporter into `receiver`.
async fn run_ten(receiver: &Arc<SimulatedReceiver>) -> IdSet {
    let exporter = RetryingExporterFactory::default()
        .create(
            &fast_exporter_config(),
            DataType::Logs,
            Endpoint::Local(receiver.clone()),
        )
        .unwrap();
    exporter.start().await.unwrap();
    let report = ConcurrentGenerator::new(DataType::Logs, 10, 1)
        .run(exporter.clone())
        .await
        .unwrap();
    ConvergenceChecker::new(Duration::from_millis(10), Duration::from_secs(5))
        .wait(&report.generated, receiver, &CancellationToken::new())
        .await
        .unwrap();
    exporter.shutdown().await.unwrap();
    report.generated
}

#[tokio::test]
async fn always_succeed_accounts_for_every_item() {
    let receiver = Arc::new(SimulatedReceiver::new(DataType::Logs));
    let generated = run_ten(&receiver).await;

    let snapshot = receiver.snapshot();
    assert_eq!(generated, sequence(0..10));
    assert_eq!(snapshot.counters.requests, 10);
    assert_eq!(snapshot.counters.accepted_items, 10);
    assert_eq!(snapshot.counters.total_errors(), 0);
    assert_eq!(snapshot.accepted, sequence(0..10));
    assert!(snapshot.dropped.is_empty());
}

#[tokio::test]
async fn permanent_failure_for_one_id_drops_only_that_id() {
    let receiver = Arc::new(SimulatedReceiver::with_decision(
        DataType::Logs,
        Arc::new(PermanentForIds::new(IdSet::from_iter(["3"]))),
    ));
    run_ten(&receiver).await;

    let snapshot = receiver.snapshot();
    assert_eq!(snapshot.dropped, IdSet::from_iter(["3"]));
    assert_eq!(
        snapshot.accepted,
        IdSet::from_iter(["0", "1", "2", "4", "5", "6", "7", "8", "9"])
    );
    assert_eq!(snapshot.counters.permanent_failures, 1);
    let (_, overlap) = snapshot.accepted.union(&snapshot.dropped);
    assert!(overlap.is_empty());
}

#[tokio::test]
async fn transient_failures_still_converge() {
    let receiver = Arc::new(SimulatedReceiver::with_decision(
        DataType::Logs,
        Arc::new(TransientForIds::new(IdSet::from_iter(["1", "5", "8"]), 3)),
    ));
    run_ten(&receiver).await;

    let snapshot = receiver.snapshot();
    assert_eq!(snapshot.accepted, sequence(0..10));
    assert_eq!(snapshot.counters.transient_failures, 9);
    assert_eq!(snapshot.counters.requests, 19);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn compliant_exporter_passes_every_scenario_for_every_data_type() {
    for data_type in DataType::ALL {
        let report = check_consume_contract(params(RetryMode::Compliant, data_type))
            .await
            .unwrap();
        assert_eq!(report.results.len(), ScenarioKind::ALL.len());
        report.assert_all_passed();

        for result in &report.results {
            assert_eq!(result.generated, sequence(0..10));
            let (resolved, overlap) = result.accepted.union(&result.dropped);
            assert!(overlap.is_empty());
            assert_eq!(resolved, result.generated);
        }
        let always = report.result(ScenarioKind::AlwaysSucceed).unwrap();
        assert_eq!(always.counters.successes, 10);
        assert!(always.dropped.is_empty());
    }
}

#[tokio::test]
async fn random_permanent_drops_only_ids_that_saw_a_permanent_failure() {
    let receiver = Arc::new(SimulatedReceiver::with_decision(
        DataType::Traces,
        ScenarioKind::RandomPermanent.decision(Some(7)),
    ));
    let exporter = RetryingExporterFactory::default()
        .create(
            &fast_exporter_config(),
            DataType::Traces,
            Endpoint::Local(receiver.clone()),
        )
        .unwrap();
    exporter.start().await.unwrap();
    ConcurrentGenerator::new(DataType::Traces, 50, 4)
        .run(exporter)
        .await
        .unwrap();

    let snapshot = receiver.snapshot();
    assert_eq!(snapshot.accepted.len() + snapshot.dropped.len(), 50);
    for id in &snapshot.dropped {
        let attempts = receiver.attempts(id);
        assert_eq!(attempts, vec![DecisionOutcome::PermanentFailure]);
    }
}

#[tokio::test]
async fn resending_after_permanent_failure_is_a_duplicate_resolution() {
    let report = check_consume_contract(
        params(RetryMode::ResendPermanent, DataType::Logs)
            .with_item_count(50)
            .with_scenarios([ScenarioKind::AlwaysSucceed, ScenarioKind::RandomPermanent]),
    )
    .await
    .unwrap();

    assert!(report.result(ScenarioKind::AlwaysSucceed).unwrap().passed());
    let failed = report.result(ScenarioKind::RandomPermanent).unwrap();
    assert_eq!(
        failed.failure.as_ref().map(|f| f.kind),
        Some(FailureKind::DuplicateResolution)
    );
    assert!(!failed.duplicates.is_empty());
}

#[tokio::test]
async fn exporter_that_never_retries_does_not_converge() {
    let report = check_consume_contract(
        params(RetryMode::NeverRetry, DataType::Metrics)
            .with_item_count(50)
            .with_scenarios([ScenarioKind::RandomTransient])
            .with_timing(Duration::from_millis(5), Duration::from_millis(100)),
    )
    .await
    .unwrap();

    let result = &report.results[0];
    let failure = result.failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::NonConvergence);
    assert!(!failure.harness_bug);
    assert!(result.accepted.len() < 50);
}

#[tokio::test]
async fn scenarios_are_isolated_from_each_other() {
    let report = check_consume_contract(
        params(RetryMode::NeverRetry, DataType::Logs)
            .with_item_count(50)
            .with_scenarios([ScenarioKind::RandomTransient, ScenarioKind::AlwaysSucceed])
            .with_timing(Duration::from_millis(5), Duration::from_millis(100)),
    )
    .await
    .unwrap();

    assert!(!report.results[0].passed());
    let second = &report.results[1];
    assert!(second.passed());
    assert_eq!(second.counters.requests, 50);
    assert_eq!(second.counters.transient_failures, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn tcp_transport_passes_with_concurrent_workers() {
    let metrics = Arc::new(MetricsRecorder::new().unwrap());
    let report = check_consume_contract(
        params(RetryMode::Compliant, DataType::Logs)
            .with_item_count(200)
            .with_workers(8)
            .with_receiver_binding(Arc::new(TcpBinding::localhost()))
            .with_metrics(metrics.clone()),
    )
    .await
    .unwrap();

    report.assert_all_passed();
    assert_eq!(
        metrics.scenarios.with_label_values(&["passed"]).get(),
        ScenarioKind::ALL.len() as f64
    );
    assert!(metrics.accepted_items.get() >= 200.0);
}

#[tokio::test]
async fn seeded_runs_are_reproducible() {
    let run = || async {
        check_consume_contract(
            params(RetryMode::Compliant, DataType::Logs)
                .with_workers(1)
                .with_scenarios([ScenarioKind::RandomMixed]),
        )
        .await
        .unwrap()
    };
    let first = run().await;
    let second = run().await;
    assert_eq!(first.results[0].fingerprint, second.results[0].fingerprint);
    assert_eq!(first.results[0].dropped, second.results[0].dropped);
    assert_eq!(first.results[0].counters, second.results[0].counters);
}

#[tokio::test]
async fn failed_scenarios_are_written_as_yaml() {
    let dir = tempfile::tempdir().unwrap();
    let report = check_consume_contract(
        params(RetryMode::NeverRetry, DataType::Logs)
            .with_item_count(50)
            .with_scenarios([ScenarioKind::AlwaysSucceed, ScenarioKind::RandomTransient])
            .with_timing(Duration::from_millis(5), Duration::from_millis(50))
            .with_report_dir(dir.path()),
    )
    .await
    .unwrap();
    assert_eq!(report.failures().count(), 1);

    let files: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(files.len(), 1);
    let contents = std::fs::read_to_string(&files[0]).unwrap();
    assert!(contents.contains("scenario: random_transient"));
    assert!(contents.contains("kind: non_convergence"));
}

struct RefusingFactory;

impl ExporterFactory for RefusingFactory {
    fn create(
        &self,
        _settings: &ExporterConfig,
        _data_type: DataType,
        _endpoint: Endpoint,
    ) -> Result<Arc<dyn Exporter>, HarnessError> {
        Err(HarnessError::Exporter("factory refused".into()))
    }
}

#[tokio::test]
async fn factory_failure_is_reported_per_scenario() {
    let report = check_consume_contract(
        CheckParams::new(Arc::new(RefusingFactory), DataType::Logs)
            .with_scenarios([ScenarioKind::AlwaysSucceed]),
    )
    .await
    .unwrap();
    let failure = report.results[0].failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::Exporter);
    assert!(failure.message.contains("factory refused"));
}

/// Acknowledges every batch without sending it anywhere.
struct BlackHole;

#[async_trait]
impl Exporter for BlackHole {
    async fn start(&self) -> Result<(), ExportError> {
        Ok(())
    }

    async fn consume(&self, _batch: TelemetryBatch) -> Result<(), ExportError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ExportError> {
        Ok(())
    }
}

struct BlackHoleFactory;

impl ExporterFactory for BlackHoleFactory {
    fn create(
        &self,
        _settings: &ExporterConfig,
        _data_type: DataType,
        _endpoint: Endpoint,
    ) -> Result<Arc<dyn Exporter>, HarnessError> {
        Ok(Arc::new(BlackHole))
    }
}

#[tokio::test]
async fn silently_losing_data_lists_every_missing_id() {
    let report = check_consume_contract(
        CheckParams::new(Arc::new(BlackHoleFactory), DataType::Logs)
            .with_item_count(3)
            .with_scenarios([ScenarioKind::AlwaysSucceed])
            .with_timing(Duration::from_millis(5), Duration::from_millis(40)),
    )
    .await
    .unwrap();
    let result = &report.results[0];
    assert_eq!(result.counters.requests, 0);
    let failure = result.failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::NonConvergence);
    assert!(failure.message.contains("3 missing ([0, 1, 2])"));
}

/// Forwards log batches with the id attribute removed.
struct StripIds {
    client: ExportClient,
}

#[async_trait]
impl Exporter for StripIds {
    async fn start(&self) -> Result<(), ExportError> {
        Ok(())
    }

    async fn consume(&self, mut batch: TelemetryBatch) -> Result<(), ExportError> {
        if let TelemetryBatch::Logs(data) = &mut batch {
            for record in &mut data.records {
                record.attributes.remove(UNIQUE_ID_ATTR);
            }
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
        self.client
            .export(batch, Duration::from_secs(1))
            .await
            .map_err(ExportError::Permanent)
    }

    async fn shutdown(&self) -> Result<(), ExportError> {
        Ok(())
    }
}

struct StripIdsFactory;

impl ExporterFactory for StripIdsFactory {
    fn create(
        &self,
        _settings: &ExporterConfig,
        _data_type: DataType,
        endpoint: Endpoint,
    ) -> Result<Arc<dyn Exporter>, HarnessError> {
        Ok(Arc::new(StripIds {
            client: ExportClient::connect(&endpoint),
        }))
    }
}

#[tokio::test]
async fn exporter_dropping_the_id_attribute_fails_validation_early() {
    let report = check_consume_contract(
        CheckParams::new(Arc::new(StripIdsFactory), DataType::Logs)
            .with_item_count(500)
            .with_workers(1)
            .with_scenarios([ScenarioKind::AlwaysSucceed, ScenarioKind::RandomPermanent])
            .with_timing(Duration::from_millis(5), Duration::from_secs(30)),
    )
    .await
    .unwrap();

    for result in &report.results {
        let failure = result.failure.as_ref().unwrap();
        assert_eq!(failure.kind, FailureKind::Validation);
        assert!(!failure.harness_bug);
        assert!(failure.message.contains(UNIQUE_ID_ATTR));
        assert!(result.counters.validation_failures > 0);
        assert!(result.counters.requests < 500);
    }
}
