use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

use super::chpl::{decode_batch, parse_product, ChplProduct, ChplProductList};
use super::ingest::{EntityIngest, IngestOutcome};
use super::precedence::needs_update;
use super::types::{CatalogEntityKind, CriterionLink, Product};
use super::TARGET_CATALOG;
use crate::error::ReconcileError;
use crate::registry::RegistryQuery;
use crate::store::CatalogStore;

/// Certified products, keyed by `(name, version)`.
///
/// Products are linked to vendors and criteria, so they are ingested last.
pub struct ProductIngest;

/// Resolve criterion ids to links. Ids with no stored criterion are skipped.
async fn criterion_links(
    store: &dyn CatalogStore,
    product: &Product,
) -> Result<Vec<CriterionLink>> {
    let mut links = Vec::with_capacity(product.certification_criteria.len());
    for &certification_id in &product.certification_criteria {
        match store.get_criterion(certification_id).await? {
            Some(criterion) => links.push(CriterionLink {
                criterion_id: certification_id,
                number: criterion.number,
            }),
            None => warn!(
                target: TARGET_CATALOG,
                "Product {} lists unknown criterion {}", product.identity(), certification_id
            ),
        }
    }
    Ok(links)
}

#[async_trait]
impl EntityIngest for ProductIngest {
    type Wire = ChplProduct;

    fn kind(&self) -> CatalogEntityKind {
        CatalogEntityKind::Product
    }

    fn query(&self) -> RegistryQuery {
        RegistryQuery::CertifiedProducts
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<ChplProduct>, ReconcileError> {
        Ok(decode_batch::<ChplProductList>(bytes)?.results)
    }

    async fn persist(&self, store: &dyn CatalogStore, record: &ChplProduct) -> Result<IngestOutcome> {
        let mut incoming = parse_product(record)?;
        incoming.vendor_id = store
            .get_vendor(&incoming.developer)
            .await?
            .and_then(|vendor| vendor.id);

        let (product, outcome) = match store.get_product(&incoming.name, &incoming.version).await? {
            None => (incoming, IngestOutcome::Inserted),
            Some(mut existing) => {
                if !needs_update(&existing, &incoming)? {
                    return Ok(IngestOutcome::Unchanged);
                }
                if existing.id.is_none() {
                    return Err(anyhow!("stored product {} has no id", existing.identity()));
                }
                debug!(target: TARGET_CATALOG, "Updating product {}", incoming.identity());
                existing.apply(&incoming);
                (existing, IngestOutcome::Updated)
            }
        };

        // links resolve before any write so the product and its links land together
        let links = criterion_links(store, &product).await?;
        store.save_product_with_links(&product, &links).await?;
        Ok(outcome)
    }
}
