//! # Concurrent Generator
//!
//! Produces exactly `item_count` uniquely identified items from parallel
//! workers and submits each one to the exporter under test. Ids come from a
//! single shared atomic counter, so they read "0", "1", ... in claim order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace};

use exportcheck_core::{ContractViolation, DataType, HarnessError, IdSet, TelemetryBatch, UniqueId};

use crate::exporter::Exporter;

/// Maps a claimed sequence number to an id.
pub type IdAllocator = Arc<dyn Fn(u64) -> UniqueId + Send + Sync>;

/// What one generation pass produced.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GenerationReport {
    pub generated: IdSet,
    /// `consume` calls that returned an error. Expected traffic whenever the
    /// receiver injects permanent failures.
    pub rejected: u64,
}

pub struct ConcurrentGenerator {
    data_type: DataType,
    item_count: u64,
    workers: usize,
    allocator: IdAllocator,
    cancel: CancellationToken,
}

impl ConcurrentGenerator {
    pub fn new(data_type: DataType, item_count: u64, workers: usize) -> Self {
        Self {
            data_type,
            item_count,
            workers: workers.max(1),
            allocator: Arc::new(UniqueId::from_sequence),
            cancel: CancellationToken::new(),
        }
    }

    /// Replaces sequence-number ids with a custom scheme.
    pub fn with_allocator(mut self, allocator: IdAllocator) -> Self {
        self.allocator = allocator;
        self
    }

    /// Workers stop claiming new items once `cancel` fires. Items already
    /// submitted are still reported.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Runs all workers to completion.
    ///
    /// Each worker claims a sequence number, submits one item, and records
    /// the id locally. Local batches are merged into the shared set when the
    /// worker finishes. Any id produced twice fails with
    /// [`ContractViolation::DuplicateGeneration`].
    #[instrument(skip_all, fields(data_type = %self.data_type, items = self.item_count, workers = self.workers))]
    pub async fn run(&self, exporter: Arc<dyn Exporter>) -> Result<GenerationReport, HarnessError> {
        let next = Arc::new(AtomicU64::new(0));
        let generated = Arc::new(Mutex::new(IdSet::new()));

        let mut handles = Vec::with_capacity(self.workers);
        for worker in 0..self.workers {
            let next = next.clone();
            let generated = generated.clone();
            let exporter = exporter.clone();
            let allocator = self.allocator.clone();
            let data_type = self.data_type;
            let item_count = self.item_count;
            let cancel = self.cancel.clone();

            handles.push(tokio::spawn(async move {
                let mut local = IdSet::new();
                let mut duplicates = Vec::new();
                let mut rejected = 0u64;
                while !cancel.is_cancelled() {
                    let seq = next.fetch_add(1, Ordering::Relaxed);
                    if seq >= item_count {
                        break;
                    }
                    let id = allocator(seq);
                    trace!(worker, %id, "Submitting item");
                    if let Err(e) = exporter.consume(TelemetryBatch::with_id(data_type, &id)).await {
                        debug!(worker, %id, error = %e, "Exporter rejected item");
                        rejected += 1;
                    }
                    if !local.insert(id.clone()) {
                        duplicates.push(id);
                    }
                }
                duplicates.extend(generated.lock().merge(&local));
                (duplicates, rejected)
            }));
        }

        let mut duplicates = Vec::new();
        let mut rejected = 0;
        for handle in handles {
            let (worker_duplicates, worker_rejected) = handle
                .await
                .map_err(|e| HarnessError::Exporter(format!("generator worker failed: {e}")))?;
            duplicates.extend(worker_duplicates);
            rejected += worker_rejected;
        }

        if !duplicates.is_empty() {
            duplicates.sort();
            duplicates.dedup();
            return Err(ContractViolation::DuplicateGeneration { ids: duplicates }.into());
        }

        let generated = std::mem::take(&mut *generated.lock());
        info!(generated = generated.len(), rejected, "Generation complete");
        Ok(GenerationReport {
            generated,
            rejected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporter::{ExportError, Exporter};
    use async_trait::async_trait;
    use proptest::prelude::*;

    /// Records consumed ids; rejects ids listed in `reject`.
    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<UniqueId>>,
        reject: IdSet,
    }

    #[async_trait]
    impl Exporter for Recording {
        async fn start(&self) -> Result<(), ExportError> {
            Ok(())
        }

        async fn consume(&self, batch: TelemetryBatch) -> Result<(), ExportError> {
            let ids = batch.ids().map_err(|e| ExportError::Transport(e.to_string()))?;
            self.seen.lock().extend(ids.iter().cloned());
            if ids.iter().any(|id| self.reject.contains(id)) {
                return Err(ExportError::Transport("rejected".into()));
            }
            Ok(())
        }

        async fn shutdown(&self) -> Result<(), ExportError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn ten_items_get_sequential_ids() {
        let exporter = Arc::new(Recording::default());
        let report = ConcurrentGenerator::new(DataType::Logs, 10, 1)
            .run(exporter.clone())
            .await
            .unwrap();
        let expected: IdSet = (0..10).map(UniqueId::from_sequence).collect();
        assert_eq!(report.generated, expected);
        assert_eq!(report.rejected, 0);
        assert_eq!(exporter.seen.lock().len(), 10);
    }

    #[tokio::test]
    async fn rejected_consumes_are_counted_not_fatal() {
        let exporter = Arc::new(Recording {
            reject: IdSet::from_iter(["3", "7"]),
            ..Default::default()
        });
        let report = ConcurrentGenerator::new(DataType::Traces, 10, 3)
            .run(exporter)
            .await
            .unwrap();
        assert_eq!(report.generated.len(), 10);
        assert_eq!(report.rejected, 2);
    }

    #[tokio::test]
    async fn colliding_allocator_is_a_generation_violation() {
        let generator = ConcurrentGenerator::new(DataType::Logs, 6, 2)
            .with_allocator(Arc::new(|seq| UniqueId::from_sequence(seq % 4)));
        let err = generator
            .run(Arc::new(Recording::default()))
            .await
            .unwrap_err();
        assert!(err.is_harness_bug());
        assert_eq!(
            err,
            HarnessError::Violation(ContractViolation::DuplicateGeneration {
                ids: vec![UniqueId::from("0"), UniqueId::from("1")],
            })
        );
    }

    #[tokio::test]
    async fn cancelled_generator_claims_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let exporter = Arc::new(Recording::default());
        let report = ConcurrentGenerator::new(DataType::Logs, 100, 4)
            .with_cancellation(cancel)
            .run(exporter.clone())
            .await
            .unwrap();
        assert!(report.generated.is_empty());
        assert!(exporter.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn zero_workers_still_runs_one() {
        let report = ConcurrentGenerator::new(DataType::Metrics, 3, 0)
            .run(Arc::new(Recording::default()))
            .await
            .unwrap();
        assert_eq!(report.generated.len(), 3);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn ids_are_unique_for_any_worker_count(items in 1u64..200, workers in 1usize..16) {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(4)
                .build()
                .unwrap();
            let exporter = Arc::new(Recording::default());
            let report = runtime
                .block_on(ConcurrentGenerator::new(DataType::Logs, items, workers).run(exporter.clone()))
                .unwrap();
            prop_assert_eq!(report.generated.len() as u64, items);
            prop_assert_eq!(exporter.seen.lock().len() as u64, items);
        }
    }
}
