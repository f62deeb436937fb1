//! Storage seams used by the reconciliation core.
//!
//! The core only talks to these traits. [`crate::db::Database`] implements all
//! of them on SQLite; tests use the in-memory `MemoryStore`.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::catalog::types::{Criterion, CriterionLink, Product, Vendor};
use crate::history::types::{
    HistoryOperation, HistoryRow, HistoryWindow, PruningOutcome, PruningRun,
};
use crate::matching::types::{EndpointRecord, OrganizationRecord};

#[cfg(test)]
pub mod memory;

/// Products, vendors, criteria and the product-to-criterion link table.
///
/// Lookups return `Ok(None)` when nothing is stored under the key.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get_product(&self, name: &str, version: &str) -> Result<Option<Product>>;
    /// Returns the new store id.
    async fn add_product(&self, product: &Product) -> Result<i64>;
    async fn update_product(&self, product: &Product) -> Result<()>;

    async fn delete_product_links(&self, product_id: i64) -> Result<()>;
    async fn link_product_to_criterion(
        &self,
        criterion_id: i64,
        product_id: i64,
        number: &str,
    ) -> Result<()>;

    /// Replace every criterion link of a product.
    ///
    /// Implementations with transactions should override this so readers never
    /// observe a product with a partial link set.
    async fn replace_product_links(&self, product_id: i64, links: &[CriterionLink]) -> Result<()> {
        self.delete_product_links(product_id).await?;
        for link in links {
            self.link_product_to_criterion(link.criterion_id, product_id, &link.number)
                .await?;
        }
        Ok(())
    }

    /// Insert the product when it has no id, otherwise update it, and replace
    /// its criterion links. Either everything is written or nothing is.
    /// Returns the product's store id.
    async fn save_product_with_links(&self, product: &Product, links: &[CriterionLink])
        -> Result<i64>;

    async fn get_vendor(&self, name: &str) -> Result<Option<Vendor>>;
    async fn add_vendor(&self, vendor: &Vendor) -> Result<i64>;
    async fn update_vendor(&self, vendor: &Vendor) -> Result<()>;

    async fn get_criterion(&self, certification_id: i64) -> Result<Option<Criterion>>;
    async fn add_criterion(&self, criterion: &Criterion) -> Result<i64>;
    async fn update_criterion(&self, criterion: &Criterion) -> Result<()>;
}

/// Provider-directory organizations, discovered endpoints, and the links between them.
#[async_trait]
pub trait OrganizationStore: Send + Sync {
    async fn all_organizations(&self) -> Result<Vec<OrganizationRecord>>;
    async fn get_organization(&self, npi_id: &str) -> Result<Option<OrganizationRecord>>;
    async fn all_endpoints(&self) -> Result<Vec<EndpointRecord>>;

    /// Confidence of the stored link, if one exists.
    async fn get_link(&self, organization_id: &str, url: &str) -> Result<Option<f64>>;
    async fn add_link(&self, organization_id: &str, url: &str, confidence: f64) -> Result<()>;
    async fn update_link(&self, organization_id: &str, url: &str, confidence: f64) -> Result<()>;
}

/// The append-only audit log and the bookkeeping of pruning runs.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn record_history(
        &self,
        entity_key: &str,
        operation: HistoryOperation,
        snapshot: &[u8],
        entered_at: DateTime<Utc>,
    ) -> Result<i64>;

    /// Distinct entity keys with at least one row in the window.
    async fn history_keys(&self, window: &HistoryWindow) -> Result<Vec<String>>;

    /// Rows of one key inside the window, oldest first.
    async fn history_rows(&self, entity_key: &str, window: &HistoryWindow)
        -> Result<Vec<HistoryRow>>;

    async fn delete_history_row(&self, id: i64) -> Result<()>;

    async fn last_pruning_run(&self) -> Result<Option<PruningRun>>;
    async fn start_pruning_run(&self, started_at: DateTime<Utc>) -> Result<i64>;
    async fn finish_pruning_run(
        &self,
        run_id: i64,
        finished_at: DateTime<Utc>,
        outcome: &PruningOutcome,
    ) -> Result<()>;
}
