use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tracing::debug;

use super::chpl::{decode_batch, parse_criterion, ChplCriteriaList, ChplCriterion};
use super::ingest::{EntityIngest, IngestOutcome};
use super::precedence::needs_update;
use super::types::CatalogEntityKind;
use super::TARGET_CATALOG;
use crate::error::ReconcileError;
use crate::registry::RegistryQuery;
use crate::store::CatalogStore;

/// Certification criteria, keyed by CHPL certification id.
pub struct CriteriaIngest;

#[async_trait]
impl EntityIngest for CriteriaIngest {
    type Wire = ChplCriterion;

    fn kind(&self) -> CatalogEntityKind {
        CatalogEntityKind::Criterion
    }

    fn query(&self) -> RegistryQuery {
        RegistryQuery::CertificationCriteria
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<ChplCriterion>, ReconcileError> {
        Ok(decode_batch::<ChplCriteriaList>(bytes)?.criteria)
    }

    async fn persist(
        &self,
        store: &dyn CatalogStore,
        record: &ChplCriterion,
    ) -> Result<IngestOutcome> {
        let incoming = parse_criterion(record);

        let Some(existing) = store.get_criterion(incoming.certification_id).await? else {
            store.add_criterion(&incoming).await?;
            return Ok(IngestOutcome::Inserted);
        };

        if !needs_update(&existing, &incoming)? {
            return Ok(IngestOutcome::Unchanged);
        }

        let mut updated = incoming;
        updated.id = Some(
            existing
                .id
                .ok_or_else(|| anyhow!("stored criterion {} has no id", existing.identity()))?,
        );
        updated.created_at = existing.created_at;
        debug!(target: TARGET_CATALOG, "Updating criterion {}", updated.identity());
        store.update_criterion(&updated).await?;
        Ok(IngestOutcome::Updated)
    }
}
