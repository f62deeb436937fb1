//! In-memory implementation of every store trait, for tests.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{CatalogStore, HistoryStore, OrganizationStore};
use crate::catalog::types::{Criterion, CriterionLink, Product, Vendor};
use crate::history::types::{
    HistoryOperation, HistoryRow, HistoryWindow, PruningOutcome, PruningRun,
};
use crate::matching::types::{EndpointRecord, OrganizationRecord};

#[derive(Default)]
struct State {
    next_id: i64,
    products: BTreeMap<i64, Product>,
    product_links: BTreeMap<i64, BTreeSet<CriterionLink>>,
    vendors: BTreeMap<i64, Vendor>,
    criteria: BTreeMap<i64, Criterion>,
    organizations: Vec<OrganizationRecord>,
    endpoints: Vec<EndpointRecord>,
    links: BTreeMap<(String, String), f64>,
    history: Vec<HistoryRow>,
    pruning_runs: Vec<PruningRun>,
    failing_organizations: HashSet<String>,
    failing_lookups: HashSet<String>,
    failing_link_writes: usize,
    failing_history_rows: HashSet<i64>,
}

impl State {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn with_organizations(self, organizations: Vec<OrganizationRecord>) -> Self {
        self.lock().organizations = organizations;
        self
    }

    pub fn with_endpoints(self, endpoints: Vec<EndpointRecord>) -> Self {
        self.lock().endpoints = endpoints;
        self
    }

    /// Link writes for this organization id fail.
    pub fn fail_links_for(&self, organization_id: &str) {
        self.lock()
            .failing_organizations
            .insert(organization_id.to_string());
    }

    /// Looking up the organization with this NPI id fails.
    pub fn fail_lookup_for(&self, npi_id: &str) {
        self.lock().failing_lookups.insert(npi_id.to_string());
    }

    /// The next product link write fails before anything is stored.
    pub fn fail_next_link_write(&self) {
        self.lock().failing_link_writes += 1;
    }

    /// Deleting this history row fails.
    pub fn fail_history_delete(&self, id: i64) {
        self.lock().failing_history_rows.insert(id);
    }

    pub fn products(&self) -> Vec<Product> {
        self.lock().products.values().cloned().collect()
    }

    pub fn vendors(&self) -> Vec<Vendor> {
        self.lock().vendors.values().cloned().collect()
    }

    pub fn criterion_numbers_for(&self, product_id: i64) -> Vec<String> {
        self.lock()
            .product_links
            .get(&product_id)
            .map(|links| links.iter().map(|l| l.number.clone()).collect())
            .unwrap_or_default()
    }

    pub fn links(&self) -> BTreeMap<(String, String), f64> {
        self.lock().links.clone()
    }

    pub fn history_ids(&self) -> Vec<i64> {
        self.lock().history.iter().map(|row| row.id).collect()
    }

    pub fn pruning_runs(&self) -> Vec<PruningRun> {
        self.lock().pruning_runs.clone()
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn get_product(&self, name: &str, version: &str) -> Result<Option<Product>> {
        Ok(self
            .lock()
            .products
            .values()
            .find(|p| p.name == name && p.version == version)
            .cloned())
    }

    async fn add_product(&self, product: &Product) -> Result<i64> {
        let mut state = self.lock();
        let id = state.allocate_id();
        let mut stored = product.clone();
        stored.id = Some(id);
        state.products.insert(id, stored);
        Ok(id)
    }

    async fn update_product(&self, product: &Product) -> Result<()> {
        let id = product.id.ok_or_else(|| anyhow!("product has no id"))?;
        self.lock().products.insert(id, product.clone());
        Ok(())
    }

    async fn delete_product_links(&self, product_id: i64) -> Result<()> {
        self.lock().product_links.remove(&product_id);
        Ok(())
    }

    async fn link_product_to_criterion(
        &self,
        criterion_id: i64,
        product_id: i64,
        number: &str,
    ) -> Result<()> {
        let mut state = self.lock();
        if state.failing_link_writes > 0 {
            state.failing_link_writes -= 1;
            return Err(anyhow!("product link table unavailable"));
        }
        state
            .product_links
            .entry(product_id)
            .or_default()
            .insert(CriterionLink {
                criterion_id,
                number: number.to_string(),
            });
        Ok(())
    }

    async fn save_product_with_links(
        &self,
        product: &Product,
        links: &[CriterionLink],
    ) -> Result<i64> {
        let mut state = self.lock();
        if state.failing_link_writes > 0 {
            state.failing_link_writes -= 1;
            return Err(anyhow!("product link table unavailable"));
        }
        let id = match product.id {
            Some(id) => id,
            None => state.allocate_id(),
        };
        let mut stored = product.clone();
        stored.id = Some(id);
        state.products.insert(id, stored);
        state
            .product_links
            .insert(id, links.iter().cloned().collect());
        Ok(id)
    }

    async fn get_vendor(&self, name: &str) -> Result<Option<Vendor>> {
        Ok(self
            .lock()
            .vendors
            .values()
            .find(|v| v.name == name)
            .cloned())
    }

    async fn add_vendor(&self, vendor: &Vendor) -> Result<i64> {
        let mut state = self.lock();
        let id = state.allocate_id();
        let mut stored = vendor.clone();
        stored.id = Some(id);
        state.vendors.insert(id, stored);
        Ok(id)
    }

    async fn update_vendor(&self, vendor: &Vendor) -> Result<()> {
        let id = vendor.id.ok_or_else(|| anyhow!("vendor has no id"))?;
        self.lock().vendors.insert(id, vendor.clone());
        Ok(())
    }

    async fn get_criterion(&self, certification_id: i64) -> Result<Option<Criterion>> {
        Ok(self
            .lock()
            .criteria
            .values()
            .find(|c| c.certification_id == certification_id)
            .cloned())
    }

    async fn add_criterion(&self, criterion: &Criterion) -> Result<i64> {
        let mut state = self.lock();
        let id = state.allocate_id();
        let mut stored = criterion.clone();
        stored.id = Some(id);
        state.criteria.insert(id, stored);
        Ok(id)
    }

    async fn update_criterion(&self, criterion: &Criterion) -> Result<()> {
        let id = criterion.id.ok_or_else(|| anyhow!("criterion has no id"))?;
        self.lock().criteria.insert(id, criterion.clone());
        Ok(())
    }
}

#[async_trait]
impl OrganizationStore for MemoryStore {
    async fn all_organizations(&self) -> Result<Vec<OrganizationRecord>> {
        Ok(self.lock().organizations.clone())
    }

    async fn get_organization(&self, npi_id: &str) -> Result<Option<OrganizationRecord>> {
        let state = self.lock();
        if state.failing_lookups.contains(npi_id) {
            return Err(anyhow!("organization index unavailable for {}", npi_id));
        }
        Ok(state
            .organizations
            .iter()
            .find(|o| o.npi_id == npi_id)
            .cloned())
    }

    async fn all_endpoints(&self) -> Result<Vec<EndpointRecord>> {
        Ok(self.lock().endpoints.clone())
    }

    async fn get_link(&self, organization_id: &str, url: &str) -> Result<Option<f64>> {
        Ok(self
            .lock()
            .links
            .get(&(organization_id.to_string(), url.to_string()))
            .copied())
    }

    async fn add_link(&self, organization_id: &str, url: &str, confidence: f64) -> Result<()> {
        let mut state = self.lock();
        if state.failing_organizations.contains(organization_id) {
            return Err(anyhow!("link table unavailable for {}", organization_id));
        }
        state
            .links
            .insert((organization_id.to_string(), url.to_string()), confidence);
        Ok(())
    }

    async fn update_link(&self, organization_id: &str, url: &str, confidence: f64) -> Result<()> {
        self.add_link(organization_id, url, confidence).await
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn record_history(
        &self,
        entity_key: &str,
        operation: HistoryOperation,
        snapshot: &[u8],
        entered_at: DateTime<Utc>,
    ) -> Result<i64> {
        let mut state = self.lock();
        let id = state.allocate_id();
        state.history.push(HistoryRow {
            id,
            entity_key: entity_key.to_string(),
            operation,
            snapshot: snapshot.to_vec(),
            entered_at,
        });
        Ok(id)
    }

    async fn history_keys(&self, window: &HistoryWindow) -> Result<Vec<String>> {
        let keys: BTreeSet<String> = self
            .lock()
            .history
            .iter()
            .filter(|row| window.contains(row.entered_at))
            .map(|row| row.entity_key.clone())
            .collect();
        Ok(keys.into_iter().collect())
    }

    async fn history_rows(
        &self,
        entity_key: &str,
        window: &HistoryWindow,
    ) -> Result<Vec<HistoryRow>> {
        let mut rows: Vec<HistoryRow> = self
            .lock()
            .history
            .iter()
            .filter(|row| row.entity_key == entity_key && window.contains(row.entered_at))
            .cloned()
            .collect();
        rows.sort_by_key(|row| (row.entered_at, row.id));
        Ok(rows)
    }

    async fn delete_history_row(&self, id: i64) -> Result<()> {
        let mut state = self.lock();
        if state.failing_history_rows.contains(&id) {
            return Err(anyhow!("history row {} is locked", id));
        }
        state.history.retain(|row| row.id != id);
        Ok(())
    }

    async fn last_pruning_run(&self) -> Result<Option<PruningRun>> {
        Ok(self.lock().pruning_runs.last().cloned())
    }

    async fn start_pruning_run(&self, started_at: DateTime<Utc>) -> Result<i64> {
        let mut state = self.lock();
        let id = state.allocate_id();
        state.pruning_runs.push(PruningRun {
            id,
            started_at,
            finished_at: None,
            successful: false,
            rows_processed: 0,
            rows_pruned: 0,
        });
        Ok(id)
    }

    async fn finish_pruning_run(
        &self,
        run_id: i64,
        finished_at: DateTime<Utc>,
        outcome: &PruningOutcome,
    ) -> Result<()> {
        let mut state = self.lock();
        let run = state
            .pruning_runs
            .iter_mut()
            .find(|run| run.id == run_id)
            .ok_or_else(|| anyhow!("no pruning run {}", run_id))?;
        run.finished_at = Some(finished_at);
        run.successful = outcome.successful;
        run.rows_processed = outcome.rows_processed as i64;
        run.rows_pruned = outcome.rows_pruned as i64;
        Ok(())
    }
}
