use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use tracing::instrument;

use super::core::{from_json, to_json, Database};
use crate::catalog::types::Location;
use crate::db::Row;
use crate::matching::types::{EndpointRecord, OrganizationRecord};
use crate::store::OrganizationStore;

fn organization_from_row(row: &SqliteRow) -> Result<OrganizationRecord, sqlx::Error> {
    let location: Option<String> = row.try_get("location")?;
    Ok(OrganizationRecord {
        id: Some(row.try_get("id")?),
        npi_id: row.try_get("npi_id")?,
        primary_name: row.try_get("primary_name")?,
        secondary_name: row.try_get("secondary_name")?,
        location: location.as_deref().map(from_json::<Location>).transpose()?,
        taxonomy: row.try_get("taxonomy")?,
    })
}

fn endpoint_from_row(row: &SqliteRow) -> Result<EndpointRecord, sqlx::Error> {
    Ok(EndpointRecord {
        id: Some(row.try_get("id")?),
        url: row.try_get("url")?,
        organization_name: row.try_get("organization_name")?,
        alternate_names: from_json(&row.try_get::<String, _>("alternate_names")?)?,
        npi_ids: from_json(&row.try_get::<String, _>("npi_ids")?)?,
    })
}

impl Database {
    /// Insert or refresh an organization from a provider-directory load.
    pub async fn upsert_organization(
        &self,
        organization: &OrganizationRecord,
    ) -> Result<i64, sqlx::Error> {
        let location = organization.location.as_ref().map(to_json).transpose()?;
        sqlx::query_scalar(
            r#"
            INSERT INTO organizations (npi_id, primary_name, secondary_name, location, taxonomy)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(npi_id) DO UPDATE SET
                primary_name = ?2, secondary_name = ?3, location = ?4, taxonomy = ?5
            RETURNING id;
            "#,
        )
        .bind(&organization.npi_id)
        .bind(&organization.primary_name)
        .bind(&organization.secondary_name)
        .bind(location)
        .bind(&organization.taxonomy)
        .fetch_one(self.pool())
        .await
    }

    /// Insert or refresh a discovered endpoint.
    pub async fn upsert_endpoint(&self, endpoint: &EndpointRecord) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            INSERT INTO endpoints (url, organization_name, alternate_names, npi_ids)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(url) DO UPDATE SET
                organization_name = ?2, alternate_names = ?3, npi_ids = ?4
            RETURNING id;
            "#,
        )
        .bind(&endpoint.url)
        .bind(&endpoint.organization_name)
        .bind(to_json(&endpoint.alternate_names)?)
        .bind(to_json(&endpoint.npi_ids)?)
        .fetch_one(self.pool())
        .await
    }
}

#[async_trait]
impl OrganizationStore for Database {
    #[instrument(target = "db", level = "info", skip(self))]
    async fn all_organizations(&self) -> Result<Vec<OrganizationRecord>> {
        let rows = sqlx::query("SELECT * FROM organizations ORDER BY id;")
            .fetch_all(self.pool())
            .await
            .context("failed to select organizations")?;
        Ok(rows
            .iter()
            .map(organization_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn get_organization(&self, npi_id: &str) -> Result<Option<OrganizationRecord>> {
        let row = sqlx::query("SELECT * FROM organizations WHERE npi_id = ?1;")
            .bind(npi_id)
            .fetch_optional(self.pool())
            .await
            .context("failed to select organization")?;
        Ok(row.as_ref().map(organization_from_row).transpose()?)
    }

    #[instrument(target = "db", level = "info", skip(self))]
    async fn all_endpoints(&self) -> Result<Vec<EndpointRecord>> {
        let rows = sqlx::query("SELECT * FROM endpoints ORDER BY id;")
            .fetch_all(self.pool())
            .await
            .context("failed to select endpoints")?;
        Ok(rows
            .iter()
            .map(endpoint_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn get_link(&self, organization_id: &str, url: &str) -> Result<Option<f64>> {
        let confidence = sqlx::query_scalar(
            r#"
            SELECT confidence FROM organization_endpoint_links
            WHERE organization_id = ?1 AND endpoint_url = ?2;
            "#,
        )
        .bind(organization_id)
        .bind(url)
        .fetch_optional(self.pool())
        .await
        .context("failed to select link")?;
        Ok(confidence)
    }

    async fn add_link(&self, organization_id: &str, url: &str, confidence: f64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO organization_endpoint_links (organization_id, endpoint_url, confidence)
            VALUES (?1, ?2, ?3);
            "#,
        )
        .bind(organization_id)
        .bind(url)
        .bind(confidence)
        .execute(self.pool())
        .await
        .context("failed to insert link")?;
        Ok(())
    }

    async fn update_link(&self, organization_id: &str, url: &str, confidence: f64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE organization_endpoint_links SET confidence = ?3
            WHERE organization_id = ?1 AND endpoint_url = ?2;
            "#,
        )
        .bind(organization_id)
        .bind(url)
        .bind(confidence)
        .execute(self.pool())
        .await
        .context("failed to update link")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::persist::link_all_orgs_and_endpoints;
    use tokio::sync::watch;

    #[tokio::test]
    async fn test_linking_against_sqlite() {
        let db = Database::in_memory().await.unwrap();
        db.upsert_organization(
            &OrganizationRecord::new("1002", "Saint Luke Hospital")
                .with_secondary_name("St Luke Medical Group"),
        )
        .await
        .unwrap();
        db.upsert_endpoint(
            &EndpointRecord::new("https://fhir.stluke.org/r4", "St Luke Medical Group")
                .with_alternate_name("Saint Luke Hospital"),
        )
        .await
        .unwrap();
        let (_tx, rx) = watch::channel(false);

        let summary = link_all_orgs_and_endpoints(&db, 0.75, false, &rx)
            .await
            .unwrap();
        assert_eq!(summary.links_written, 1);
        assert_eq!(
            db.get_link("1002", "https://fhir.stluke.org/r4").await.unwrap(),
            Some(1.0)
        );

        // a second run finds nothing to raise
        let again = link_all_orgs_and_endpoints(&db, 0.75, false, &rx)
            .await
            .unwrap();
        assert_eq!(again.links_written, 0);
    }

    #[tokio::test]
    async fn test_endpoint_lists_round_trip() {
        let db = Database::in_memory().await.unwrap();
        let endpoint = EndpointRecord::new("https://fhir.example.org", "Example Clinic")
            .with_npi_ids(&["1", "2"]);
        db.upsert_endpoint(&endpoint).await.unwrap();

        let stored = db.all_endpoints().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].npi_ids, vec!["1".to_string(), "2".to_string()]);
        assert_eq!(stored[0].organization_name, "Example Clinic");
    }
}
