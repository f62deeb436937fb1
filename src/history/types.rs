use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The write that produced a history row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HistoryOperation {
    Insert,
    Update,
}

impl HistoryOperation {
    /// Single-letter code stored in the history table.
    pub fn code(&self) -> &'static str {
        match self {
            HistoryOperation::Insert => "I",
            HistoryOperation::Update => "U",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "I" => Some(HistoryOperation::Insert),
            "U" => Some(HistoryOperation::Update),
            _ => None,
        }
    }
}

impl fmt::Display for HistoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One append-only audit row.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRow {
    pub id: i64,
    pub entity_key: String,
    pub operation: HistoryOperation,
    pub snapshot: Vec<u8>,
    pub entered_at: DateTime<Utc>,
}

/// Restricts a history scan to rows entered at or after `since`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HistoryWindow {
    pub since: Option<DateTime<Utc>>,
}

impl HistoryWindow {
    pub fn all() -> Self {
        HistoryWindow { since: None }
    }

    pub fn contains(&self, entered_at: DateTime<Utc>) -> bool {
        self.since.map_or(true, |since| entered_at >= since)
    }
}

/// Counters recorded when a pruning run finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruningOutcome {
    pub successful: bool,
    pub keys_processed: usize,
    pub rows_processed: usize,
    pub rows_pruned: usize,
    pub rows_failed: usize,
}

/// A row of the pruning metadata table.
#[derive(Debug, Clone, PartialEq)]
pub struct PruningRun {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub successful: bool,
    pub rows_processed: i64,
    pub rows_pruned: i64,
}
