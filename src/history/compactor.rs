use chrono::{DateTime, Duration, Utc};

use super::types::{HistoryOperation, HistoryRow};

/// The row the next one is compared against.
#[derive(Clone, Copy)]
enum Retained<'a> {
    NoPriorRow,
    HavePriorRow(&'a HistoryRow),
}

/// Ids of redundant rows among one entity's history, oldest first.
///
/// A retained row is deleted when the next row carries a byte-identical
/// snapshot, the retained row is an update, and it is older than `threshold`
/// relative to `now`. The newest row of a run of identical snapshots always
/// survives, and insert rows are never deleted.
pub fn plan_deletions(rows: &[HistoryRow], now: DateTime<Utc>, threshold: Duration) -> Vec<i64> {
    let mut deletions = Vec::new();
    let mut retained = Retained::NoPriorRow;

    for row in rows {
        if let Retained::HavePriorRow(prior) = retained {
            let identical = prior.snapshot == row.snapshot;
            let deletable = prior.operation == HistoryOperation::Update;
            let aged = now - prior.entered_at > threshold;
            if identical && deletable && aged {
                deletions.push(prior.id);
            }
        }
        retained = Retained::HavePriorRow(row);
    }

    deletions
}
