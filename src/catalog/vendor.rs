use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tracing::debug;

use super::chpl::{decode_batch, parse_vendor, ChplVendor, ChplVendorList};
use super::equality::FieldwiseEq;
use super::ingest::{EntityIngest, IngestOutcome};
use super::types::CatalogEntityKind;
use super::TARGET_CATALOG;
use crate::error::ReconcileError;
use crate::registry::RegistryQuery;
use crate::store::CatalogStore;

/// Health IT developers, keyed by name.
///
/// Vendors carry no edition or certification date, so there is no
/// precedence check: any difference overwrites the stored record.
pub struct VendorIngest;

#[async_trait]
impl EntityIngest for VendorIngest {
    type Wire = ChplVendor;

    fn kind(&self) -> CatalogEntityKind {
        CatalogEntityKind::Vendor
    }

    fn query(&self) -> RegistryQuery {
        RegistryQuery::Developers
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<ChplVendor>, ReconcileError> {
        Ok(decode_batch::<ChplVendorList>(bytes)?.developers)
    }

    async fn persist(&self, store: &dyn CatalogStore, record: &ChplVendor) -> Result<IngestOutcome> {
        let incoming = parse_vendor(record);

        let Some(existing) = store.get_vendor(&incoming.name).await? else {
            store.add_vendor(&incoming).await?;
            return Ok(IngestOutcome::Inserted);
        };

        if let Some(field) = existing.first_difference(&incoming) {
            debug!(
                target: TARGET_CATALOG,
                "Vendor {} changed '{}', overwriting", incoming.name, field
            );
            let mut updated = incoming;
            updated.id = Some(
                existing
                    .id
                    .ok_or_else(|| anyhow!("stored vendor {} has no id", existing.name))?,
            );
            updated.created_at = existing.created_at;
            store.update_vendor(&updated).await?;
            return Ok(IngestOutcome::Updated);
        }

        Ok(IngestOutcome::Unchanged)
    }
}
