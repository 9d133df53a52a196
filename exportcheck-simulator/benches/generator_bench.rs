#[macro_use]
extern crate criterion;

use std::sync::Arc;

use criterion::{black_box, Criterion};
use exportcheck_config::ExporterConfig;
use exportcheck_core::DataType;
use exportcheck_simulator::{
    ConcurrentGenerator, Endpoint, ExporterFactory, RetryingExporterFactory, SimulatedReceiver,
};

/// Items pushed through the reference exporter into an in-process receiver that accepts everything.
fn benchmark_generation_throughput(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let num_items = 10_000;

    for workers in [1, 8] {
        c.bench_function(&format!("generate_{num_items}_items_{workers}_workers"), |b| {
            b.iter(|| {
                runtime.block_on(async {
                    let receiver = Arc::new(SimulatedReceiver::new(DataType::Logs));
                    let exporter = RetryingExporterFactory::default()
                        .create(&ExporterConfig::default(), DataType::Logs, Endpoint::Local(receiver))
                        .unwrap();
                    exporter.start().await.unwrap();
                    let report = ConcurrentGenerator::new(DataType::Logs, num_items, workers)
                        .run(exporter)
                        .await
                        .unwrap();
                    black_box(report.generated.len())
                })
            })
        });
    }
}

criterion_group!(benches, benchmark_generation_throughput);
criterion_main!(benches);
