pub mod catalog;
pub mod db;
pub mod environment;
pub mod error;
pub mod history;
pub mod logging;
pub mod matching;
pub mod registry;
pub mod store;

pub use error::ReconcileError;

pub const TARGET_WEB_REQUEST: &str = "web_request";
pub const TARGET_DB: &str = "db_query";
pub const TARGET_CATALOG: &str = "catalog";
pub const TARGET_LINKER: &str = "linker";
pub const TARGET_HISTORY: &str = "history";

use tokio::sync::watch;

/// Returns true once the host process has signalled cancellation.
pub fn is_cancelled(cancel_rx: &watch::Receiver<bool>) -> bool {
    *cancel_rx.borrow()
}
