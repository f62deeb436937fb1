//! The batch loop shared by the product, vendor and criteria ingestors.

use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use super::criteria::CriteriaIngest;
use super::product::ProductIngest;
use super::types::CatalogEntityKind;
use super::vendor::VendorIngest;
use super::TARGET_CATALOG;
use crate::error::{find_reconcile_error, ReconcileError};
use crate::is_cancelled;
use crate::registry::{RegistryFetcher, RegistryQuery};
use crate::store::CatalogStore;

/// What happened to one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// Counters for one batch of one entity kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub entity: CatalogEntityKind,
    pub total: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub conflicts: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn empty(entity: CatalogEntityKind) -> Self {
        Self {
            entity,
            total: 0,
            inserted: 0,
            updated: 0,
            unchanged: 0,
            conflicts: 0,
            failed: 0,
        }
    }

    pub fn processed(&self) -> usize {
        self.inserted + self.updated + self.unchanged
    }

    pub fn skipped(&self) -> usize {
        self.conflicts + self.failed
    }

    fn record(&mut self, outcome: IngestOutcome) {
        match outcome {
            IngestOutcome::Inserted => self.inserted += 1,
            IngestOutcome::Updated => self.updated += 1,
            IngestOutcome::Unchanged => self.unchanged += 1,
        }
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} records, {} inserted, {} updated, {} unchanged, {} conflicts, {} failed",
            self.entity,
            self.total,
            self.inserted,
            self.updated,
            self.unchanged,
            self.conflicts,
            self.failed
        )
    }
}

/// One kind of catalog entity: where it comes from, how a batch decodes, and
/// how a single wire record is reconciled against the store.
#[async_trait]
pub trait EntityIngest: Send + Sync {
    type Wire: Send + Sync;

    fn kind(&self) -> CatalogEntityKind;
    fn query(&self) -> RegistryQuery;
    fn decode(&self, bytes: &[u8]) -> Result<Vec<Self::Wire>, ReconcileError>;
    async fn persist(&self, store: &dyn CatalogStore, record: &Self::Wire) -> Result<IngestOutcome>;
}

/// Fetch, decode and persist one batch.
///
/// Fetch and decode failures are logged and yield an empty report. A record
/// that fails is logged and counted, and the loop moves on. Cancellation is
/// checked before decoding and before every record.
pub async fn run_batch<I: EntityIngest>(
    ingest: &I,
    fetcher: &dyn RegistryFetcher,
    store: &dyn CatalogStore,
    cancel_rx: &watch::Receiver<bool>,
) -> Result<BatchReport, ReconcileError> {
    let kind = ingest.kind();
    if is_cancelled(cancel_rx) {
        return Err(ReconcileError::CancelledBeforeStart {
            entity: kind.as_str(),
        });
    }

    let bytes = match fetcher.fetch_batch(&ingest.query()).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(target: TARGET_CATALOG, "Failed to fetch {} batch: {:#}", kind, e);
            return Ok(BatchReport::empty(kind));
        }
    };

    if is_cancelled(cancel_rx) {
        return Err(ReconcileError::CancelledBeforeStart {
            entity: kind.as_str(),
        });
    }

    let records = match ingest.decode(&bytes) {
        Ok(records) => records,
        Err(e) => {
            warn!(target: TARGET_CATALOG, "Failed to decode {} batch: {}", kind, e);
            return Ok(BatchReport::empty(kind));
        }
    };

    persist_all(ingest, store, &records, cancel_rx).await
}

/// Persist already decoded records in order.
pub async fn persist_all<I: EntityIngest>(
    ingest: &I,
    store: &dyn CatalogStore,
    records: &[I::Wire],
    cancel_rx: &watch::Receiver<bool>,
) -> Result<BatchReport, ReconcileError> {
    let kind = ingest.kind();
    let mut report = BatchReport::empty(kind);
    report.total = records.len();

    for (index, record) in records.iter().enumerate() {
        if is_cancelled(cancel_rx) {
            if index == 0 {
                return Err(ReconcileError::CancelledBeforeStart {
                    entity: kind.as_str(),
                });
            }
            return Err(ReconcileError::Cancelled {
                entity: kind.as_str(),
                processed: index,
                total: records.len(),
            });
        }

        match ingest.persist(store, record).await {
            Ok(outcome) => report.record(outcome),
            Err(e) => match find_reconcile_error(&e) {
                Some(domain) if domain.is_conflict() => {
                    warn!(target: TARGET_CATALOG, "{} conflict: {}", kind, domain);
                    report.conflicts += 1;
                }
                _ => {
                    error!(target: TARGET_CATALOG, "Failed to persist {}: {:#}", kind, e);
                    report.failed += 1;
                }
            },
        }
    }

    info!(target: TARGET_CATALOG, "{}", report);
    Ok(report)
}

/// Reports of a full catalog run. A cancelled run keeps the reports of the
/// batches that finished before the signal arrived.
#[derive(Debug)]
pub struct CatalogRun {
    pub reports: Vec<BatchReport>,
    pub cancelled: Option<ReconcileError>,
}

/// Runs the three catalog batches in dependency order: criteria and vendors
/// first so products can link to them.
pub struct CatalogIngestor {
    fetcher: Arc<dyn RegistryFetcher>,
    store: Arc<dyn CatalogStore>,
}

impl CatalogIngestor {
    pub fn new(fetcher: Arc<dyn RegistryFetcher>, store: Arc<dyn CatalogStore>) -> Self {
        Self { fetcher, store }
    }

    pub async fn run_criteria(
        &self,
        cancel_rx: &watch::Receiver<bool>,
    ) -> Result<BatchReport, ReconcileError> {
        run_batch(&CriteriaIngest, &*self.fetcher, &*self.store, cancel_rx).await
    }

    pub async fn run_vendors(
        &self,
        cancel_rx: &watch::Receiver<bool>,
    ) -> Result<BatchReport, ReconcileError> {
        run_batch(&VendorIngest, &*self.fetcher, &*self.store, cancel_rx).await
    }

    pub async fn run_products(
        &self,
        cancel_rx: &watch::Receiver<bool>,
    ) -> Result<BatchReport, ReconcileError> {
        run_batch(&ProductIngest, &*self.fetcher, &*self.store, cancel_rx).await
    }

    pub async fn run(&self, cancel_rx: watch::Receiver<bool>) -> CatalogRun {
        let mut reports = Vec::with_capacity(3);
        for kind in [
            CatalogEntityKind::Criterion,
            CatalogEntityKind::Vendor,
            CatalogEntityKind::Product,
        ] {
            let result = match kind {
                CatalogEntityKind::Criterion => self.run_criteria(&cancel_rx).await,
                CatalogEntityKind::Vendor => self.run_vendors(&cancel_rx).await,
                CatalogEntityKind::Product => self.run_products(&cancel_rx).await,
            };
            match result {
                Ok(report) => reports.push(report),
                Err(e) => {
                    return CatalogRun {
                        reports,
                        cancelled: Some(e),
                    }
                }
            }
        }
        CatalogRun {
            reports,
            cancelled: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::fixture::StaticFetcher;
    use crate::store::memory::MemoryStore;

    /// Counts records and trips the cancel signal after `cancel_after` of them.
    struct Tripwire {
        cancel_tx: watch::Sender<bool>,
        cancel_after: usize,
        seen: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl EntityIngest for Tripwire {
        type Wire = u32;

        fn kind(&self) -> CatalogEntityKind {
            CatalogEntityKind::Vendor
        }

        fn query(&self) -> RegistryQuery {
            RegistryQuery::Developers
        }

        fn decode(&self, bytes: &[u8]) -> Result<Vec<u32>, ReconcileError> {
            serde_json::from_slice(bytes).map_err(|e| ReconcileError::MalformedWireField {
                field: "batch",
                detail: e.to_string(),
            })
        }

        async fn persist(&self, _store: &dyn CatalogStore, _record: &u32) -> Result<IngestOutcome> {
            let seen = self.seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            if seen == self.cancel_after {
                self.cancel_tx.send(true).unwrap();
            }
            Ok(IngestOutcome::Inserted)
        }
    }

    fn tripwire(cancel_after: usize) -> (Tripwire, watch::Receiver<bool>) {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        (
            Tripwire {
                cancel_tx,
                cancel_after,
                seen: Default::default(),
            },
            cancel_rx,
        )
    }

    #[tokio::test]
    async fn test_mid_batch_cancellation_reports_progress() {
        let (ingest, rx) = tripwire(2);
        let fetcher = StaticFetcher::new().respond(RegistryQuery::Developers, "[1, 2, 3, 4]");
        let store = MemoryStore::new();

        let err = run_batch(&ingest, &fetcher, &store, &rx).await.unwrap_err();
        match err {
            ReconcileError::Cancelled {
                processed, total, ..
            } => {
                assert_eq!(processed, 2);
                assert_eq!(total, 4);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(is_cancelled(&rx));
    }

    /// Trips the cancel signal whenever a given query is fetched.
    struct CancellingFetcher {
        inner: StaticFetcher,
        trigger: RegistryQuery,
        cancel_tx: watch::Sender<bool>,
    }

    #[async_trait]
    impl RegistryFetcher for CancellingFetcher {
        async fn fetch_batch(&self, query: &RegistryQuery) -> Result<Vec<u8>> {
            if *query == self.trigger {
                self.cancel_tx.send(true).unwrap();
            }
            self.inner.fetch_batch(query).await
        }
    }

    #[tokio::test]
    async fn test_cancelled_run_keeps_finished_reports() {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let fetcher = CancellingFetcher {
            inner: StaticFetcher::new()
                .respond(
                    RegistryQuery::CertificationCriteria,
                    r#"{"criteria":[{"id":1,"number":"A","certificationEdition":"2015"}]}"#,
                )
                .respond(RegistryQuery::Developers, r#"{"developers":[]}"#),
            trigger: RegistryQuery::Developers,
            cancel_tx,
        };
        let store = Arc::new(MemoryStore::new());
        let ingestor = CatalogIngestor::new(Arc::new(fetcher), store);

        let run = ingestor.run(cancel_rx).await;
        assert_eq!(run.reports.len(), 1);
        assert_eq!(run.reports[0].entity, CatalogEntityKind::Criterion);
        assert_eq!(run.reports[0].inserted, 1);
        assert!(matches!(
            run.cancelled,
            Some(ReconcileError::CancelledBeforeStart { entity: "vendor" })
        ));
    }

    #[tokio::test]
    async fn test_decode_failure_yields_empty_report() {
        let (ingest, rx) = tripwire(usize::MAX);
        let fetcher = StaticFetcher::new().respond(RegistryQuery::Developers, "[1, 2,");
        let store = MemoryStore::new();

        let report = run_batch(&ingest, &fetcher, &store, &rx).await.unwrap();
        assert_eq!(report, BatchReport::empty(CatalogEntityKind::Vendor));
    }

    #[tokio::test]
    async fn test_full_batch_counts_every_record() {
        let (ingest, rx) = tripwire(usize::MAX);
        let fetcher = StaticFetcher::new().respond(RegistryQuery::Developers, "[7, 8, 9]");
        let store = MemoryStore::new();

        let report = run_batch(&ingest, &fetcher, &store, &rx).await.unwrap();
        assert_eq!(report.total, 3);
        assert_eq!(report.processed(), 3);
        assert_eq!(report.skipped(), 0);
    }
}
