//! Compaction of the append-only history log.

pub mod compactor;
pub mod pruning;
pub mod types;

pub(crate) use crate::TARGET_HISTORY;

pub use compactor::plan_deletions;
pub use pruning::{prune_history, PruningConfig};
pub use types::{HistoryOperation, HistoryRow, HistoryWindow, PruningOutcome, PruningRun};
