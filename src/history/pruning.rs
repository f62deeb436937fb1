use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::compactor::plan_deletions;
use super::types::{HistoryWindow, PruningOutcome};
use super::TARGET_HISTORY;
use crate::environment::Settings;
use crate::error::ReconcileError;
use crate::is_cancelled;
use crate::store::HistoryStore;

const ENTITY: &str = "history";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PruningConfig {
    /// Rows younger than this are never deleted.
    pub threshold: Duration,
    /// Only scan rows entered within this long before the run.
    pub lookback: Option<Duration>,
}

impl PruningConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            threshold: Duration::minutes(settings.pruning_threshold_minutes),
            lookback: settings.pruning_lookback_minutes.map(Duration::minutes),
        }
    }
}

/// Pick the scan window. An explicit lookback wins; otherwise resume after
/// the last successful run, re-examining rows that were still protected then.
async fn resolve_window(
    store: &dyn HistoryStore,
    config: &PruningConfig,
    now: DateTime<Utc>,
) -> Result<HistoryWindow> {
    if let Some(lookback) = config.lookback {
        return Ok(HistoryWindow {
            since: Some(now - lookback),
        });
    }
    let since = match store.last_pruning_run().await? {
        Some(run) if run.successful => Some(run.started_at - config.threshold),
        _ => None,
    };
    Ok(HistoryWindow { since })
}

async fn finish(
    store: &dyn HistoryStore,
    run_id: i64,
    outcome: &PruningOutcome,
) -> Result<()> {
    store
        .finish_pruning_run(run_id, Utc::now(), outcome)
        .await
        .context("failed to record pruning run")
}

/// Remove redundant history rows for every entity key.
///
/// Each run is recorded in the pruning metadata with its counters and whether
/// it completed cleanly. A row that fails to delete is logged and counted;
/// the run then finishes unsuccessful.
pub async fn prune_history(
    store: &dyn HistoryStore,
    config: &PruningConfig,
    now: DateTime<Utc>,
    cancel_rx: &watch::Receiver<bool>,
) -> Result<PruningOutcome> {
    if is_cancelled(cancel_rx) {
        return Err(ReconcileError::CancelledBeforeStart { entity: ENTITY }.into());
    }

    let window = resolve_window(store, config, now).await?;
    let run_id = store.start_pruning_run(now).await?;
    let mut outcome = PruningOutcome::default();

    let keys = match store.history_keys(&window).await {
        Ok(keys) => keys,
        Err(e) => {
            finish(store, run_id, &outcome).await?;
            return Err(e.context("failed to list history keys"));
        }
    };
    debug!(target: TARGET_HISTORY, "Pruning {} entity keys since {:?}", keys.len(), window.since);

    for (index, key) in keys.iter().enumerate() {
        if is_cancelled(cancel_rx) {
            finish(store, run_id, &outcome).await?;
            return Err(ReconcileError::Cancelled {
                entity: ENTITY,
                processed: index,
                total: keys.len(),
            }
            .into());
        }

        let rows = match store.history_rows(key, &window).await {
            Ok(rows) => rows,
            Err(e) => {
                finish(store, run_id, &outcome).await?;
                return Err(e.context(format!("failed to read history for {}", key)));
            }
        };
        outcome.rows_processed += rows.len();

        for id in plan_deletions(&rows, now, config.threshold) {
            match store.delete_history_row(id).await {
                Ok(()) => outcome.rows_pruned += 1,
                Err(e) => {
                    error!(target: TARGET_HISTORY, "Failed to delete history row {} of {}: {:#}", id, key, e);
                    outcome.rows_failed += 1;
                }
            }
        }
        outcome.keys_processed += 1;
    }

    outcome.successful = outcome.rows_failed == 0;
    if !outcome.successful {
        warn!(target: TARGET_HISTORY, "{} history rows could not be deleted", outcome.rows_failed);
    }
    finish(store, run_id, &outcome).await?;

    info!(
        target: TARGET_HISTORY,
        "Pruned {} of {} history rows across {} keys",
        outcome.rows_pruned,
        outcome.rows_processed,
        outcome.keys_processed
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::find_reconcile_error;
    use crate::history::types::HistoryOperation;
    use crate::store::memory::MemoryStore;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn config() -> PruningConfig {
        PruningConfig {
            threshold: Duration::minutes(30),
            lookback: None,
        }
    }

    async fn seed(store: &MemoryStore, key: &str, snapshots: &[(&str, i64)]) -> Vec<i64> {
        let mut ids = Vec::new();
        for (index, (snapshot, minutes_ago)) in snapshots.iter().enumerate() {
            let operation = if index == 0 {
                HistoryOperation::Insert
            } else {
                HistoryOperation::Update
            };
            ids.push(
                store
                    .record_history(
                        key,
                        operation,
                        snapshot.as_bytes(),
                        now() - Duration::minutes(*minutes_ago),
                    )
                    .await
                    .unwrap(),
            );
        }
        ids
    }

    #[tokio::test]
    async fn test_prune_removes_redundant_updates_per_key() {
        let store = MemoryStore::new();
        let a = seed(&store, "a", &[("1", 500), ("1", 400), ("1", 300), ("2", 200)]).await;
        let b = seed(&store, "b", &[("x", 500), ("x", 10)]).await;
        let (_tx, rx) = watch::channel(false);

        let outcome = prune_history(&store, &config(), now(), &rx).await.unwrap();
        assert!(outcome.successful);
        assert_eq!(outcome.keys_processed, 2);
        assert_eq!(outcome.rows_processed, 6);
        assert_eq!(outcome.rows_pruned, 1);

        // key "a": the insert stays, the first update is redundant
        let remaining = store.history_ids();
        assert!(!remaining.contains(&a[1]));
        assert!(remaining.contains(&a[0]) && remaining.contains(&a[2]) && remaining.contains(&a[3]));
        assert!(remaining.contains(&b[0]) && remaining.contains(&b[1]));

        let runs = store.pruning_runs();
        assert_eq!(runs.len(), 1);
        assert!(runs[0].successful);
        assert_eq!(runs[0].rows_pruned, 1);
    }

    #[tokio::test]
    async fn test_failed_delete_marks_run_unsuccessful() {
        let store = MemoryStore::new();
        let ids = seed(&store, "a", &[("1", 500), ("1", 400), ("1", 300), ("1", 200)]).await;
        store.fail_history_delete(ids[1]);
        let (_tx, rx) = watch::channel(false);

        let outcome = prune_history(&store, &config(), now(), &rx).await.unwrap();
        assert!(!outcome.successful);
        assert_eq!(outcome.rows_pruned, 1);
        assert_eq!(outcome.rows_failed, 1);
        assert!(!store.pruning_runs()[0].successful);
    }

    #[tokio::test]
    async fn test_lookback_limits_scan() {
        let store = MemoryStore::new();
        seed(&store, "a", &[("1", 500), ("1", 400), ("1", 300)]).await;
        let (_tx, rx) = watch::channel(false);
        let config = PruningConfig {
            lookback: Some(Duration::minutes(60)),
            ..config()
        };

        let outcome = prune_history(&store, &config, now(), &rx).await.unwrap();
        assert_eq!(outcome.rows_processed, 0);
        assert_eq!(outcome.keys_processed, 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_records_no_run() {
        let store = MemoryStore::new();
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let err = prune_history(&store, &config(), now(), &rx).await.unwrap_err();
        assert!(find_reconcile_error(&err).is_some_and(|e| e.is_cancellation()));
        assert!(store.pruning_runs().is_empty());
    }
}
