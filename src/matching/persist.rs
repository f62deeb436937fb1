//! Linking stored endpoints to stored organizations.

use anyhow::Result;
use tokio::sync::watch;
use tracing::{debug, error, info};

use super::linker::{match_by_name, merge_matches};
use super::types::{EndpointRecord, LinkResult, LinkingSummary};
use super::TARGET_LINKER;
use crate::error::ReconcileError;
use crate::is_cancelled;
use crate::store::OrganizationStore;

const ENTITY: &str = "endpoint";

/// Links for the NPI ids an endpoint declares. Each known id links at 1.0.
pub async fn match_by_id(
    store: &dyn OrganizationStore,
    endpoint: &EndpointRecord,
) -> Result<Vec<LinkResult>> {
    let mut links = Vec::new();
    for npi_id in &endpoint.npi_ids {
        match store.get_organization(npi_id).await? {
            Some(organization) => links.push(LinkResult {
                organization_id: organization.npi_id,
                confidence: 1.0,
            }),
            None => debug!(
                target: TARGET_LINKER,
                "{} declares unknown NPI id {}", endpoint.url, npi_id
            ),
        }
    }
    Ok(links)
}

/// Insert a missing link or raise the confidence of a stored one.
/// Returns whether anything was written.
async fn persist_link(
    store: &dyn OrganizationStore,
    url: &str,
    link: &LinkResult,
) -> Result<bool> {
    match store.get_link(&link.organization_id, url).await? {
        None => {
            store
                .add_link(&link.organization_id, url, link.confidence)
                .await?;
            Ok(true)
        }
        Some(stored) if link.confidence > stored => {
            store
                .update_link(&link.organization_id, url, link.confidence)
                .await?;
            Ok(true)
        }
        Some(_) => Ok(false),
    }
}

/// Match every stored endpoint against every stored organization, by declared
/// NPI id and then by name, and persist the links.
///
/// An endpoint whose lookups fail, or a link that fails to persist, is logged
/// and counted and the run continues. In verbose
/// mode the names of unmatched endpoints are collected and logged.
pub async fn link_all_orgs_and_endpoints(
    store: &dyn OrganizationStore,
    threshold: f64,
    verbose: bool,
    cancel_rx: &watch::Receiver<bool>,
) -> Result<LinkingSummary> {
    if is_cancelled(cancel_rx) {
        return Err(ReconcileError::CancelledBeforeStart { entity: ENTITY }.into());
    }

    let organizations = store.all_organizations().await?;
    let endpoints = store.all_endpoints().await?;
    let mut summary = LinkingSummary {
        endpoints: endpoints.len(),
        ..Default::default()
    };

    for (index, endpoint) in endpoints.iter().enumerate() {
        if is_cancelled(cancel_rx) {
            return Err(ReconcileError::Cancelled {
                entity: ENTITY,
                processed: index,
                total: endpoints.len(),
            }
            .into());
        }

        let mut links = match match_by_id(store, endpoint).await {
            Ok(links) => links,
            Err(e) => {
                error!(
                    target: TARGET_LINKER,
                    "Failed to look up declared NPI ids of {}: {:#}", endpoint.url, e
                );
                summary.endpoints_failed += 1;
                continue;
            }
        };
        merge_matches(&mut links, match_by_name(endpoint, &organizations, threshold));

        if links.is_empty() {
            if verbose {
                debug!(
                    target: TARGET_LINKER,
                    "Unmatchable organization name '{}'", endpoint.organization_name
                );
                summary.unmatchable.push(endpoint.organization_name.clone());
            }
            continue;
        }

        summary.matched_endpoints += 1;
        for link in &links {
            match persist_link(store, &endpoint.url, link).await {
                Ok(true) => summary.links_written += 1,
                Ok(false) => {}
                Err(e) => {
                    error!(
                        target: TARGET_LINKER,
                        "Failed to link {} to organization {}: {:#}",
                        endpoint.url,
                        link.organization_id,
                        e
                    );
                    summary.links_failed += 1;
                }
            }
        }
    }

    info!(
        target: TARGET_LINKER,
        "Match Total: {}/{} endpoints ({} failed), {} links written, {} failed",
        summary.matched_endpoints,
        summary.endpoints,
        summary.endpoints_failed,
        summary.links_written,
        summary.links_failed
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::find_reconcile_error;
    use crate::matching::types::OrganizationRecord;
    use crate::store::memory::MemoryStore;

    fn store() -> MemoryStore {
        MemoryStore::new()
            .with_organizations(vec![
                OrganizationRecord::new("1001", "Mercy Health System"),
                OrganizationRecord::new("1002", "Saint Luke Hospital")
                    .with_secondary_name("St Luke Medical Group"),
            ])
            .with_endpoints(vec![
                EndpointRecord::new("https://fhir.mercy.org/r4", "Mercy Health System"),
                EndpointRecord::new("https://fhir.stluke.org/r4", "St Luke Medical Group Inc")
                    .with_npi_ids(&["1001", "9999"]),
                EndpointRecord::new("https://fhir.nowhere.org", "Nobody In Particular"),
            ])
    }

    #[tokio::test]
    async fn test_links_by_name_and_declared_id() {
        let store = store();
        let (_tx, rx) = watch::channel(false);

        let summary = link_all_orgs_and_endpoints(&store, 0.75, true, &rx)
            .await
            .unwrap();
        assert_eq!(summary.endpoints, 3);
        assert_eq!(summary.matched_endpoints, 2);
        assert_eq!(summary.links_written, 3);
        assert_eq!(summary.unmatchable, vec!["Nobody In Particular".to_string()]);

        let links = store.links();
        let key = |org: &str, url: &str| (org.to_string(), url.to_string());
        assert_eq!(links[&key("1001", "https://fhir.mercy.org/r4")], 1.0);
        assert_eq!(links[&key("1001", "https://fhir.stluke.org/r4")], 1.0);
        assert!((links[&key("1002", "https://fhir.stluke.org/r4")] - 0.8).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_existing_link_only_upgraded() {
        let store = store();
        let (_tx, rx) = watch::channel(false);
        store
            .add_link("1002", "https://fhir.stluke.org/r4", 0.9)
            .await
            .unwrap();
        store
            .add_link("1001", "https://fhir.mercy.org/r4", 0.5)
            .await
            .unwrap();

        let summary = link_all_orgs_and_endpoints(&store, 0.75, false, &rx)
            .await
            .unwrap();
        // 0.8 does not replace 0.9; 1.0 replaces 0.5
        assert_eq!(summary.links_written, 2);
        assert!(summary.unmatchable.is_empty());
        let links = store.links();
        assert_eq!(links[&("1002".to_string(), "https://fhir.stluke.org/r4".to_string())], 0.9);
        assert_eq!(links[&("1001".to_string(), "https://fhir.mercy.org/r4".to_string())], 1.0);
    }

    #[tokio::test]
    async fn test_link_failure_does_not_abort() {
        let store = store();
        store.fail_links_for("1001");
        let (_tx, rx) = watch::channel(false);

        let summary = link_all_orgs_and_endpoints(&store, 0.75, false, &rx)
            .await
            .unwrap();
        assert_eq!(summary.links_failed, 2);
        assert_eq!(summary.links_written, 1);
    }

    #[tokio::test]
    async fn test_failed_lookup_skips_only_that_endpoint() {
        let store = store();
        store.fail_lookup_for("9999");
        let (_tx, rx) = watch::channel(false);

        let summary = link_all_orgs_and_endpoints(&store, 0.75, false, &rx)
            .await
            .unwrap();
        assert_eq!(summary.endpoints_failed, 1);
        assert_eq!(summary.matched_endpoints, 1);
        assert_eq!(summary.links_written, 1);

        let links = store.links();
        assert_eq!(links.len(), 1);
        assert_eq!(links[&("1001".to_string(), "https://fhir.mercy.org/r4".to_string())], 1.0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let store = store();
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let err = link_all_orgs_and_endpoints(&store, 0.75, false, &rx)
            .await
            .unwrap_err();
        assert!(matches!(
            find_reconcile_error(&err),
            Some(ReconcileError::CancelledBeforeStart { .. })
        ));
        assert!(store.links().is_empty());
    }
}
