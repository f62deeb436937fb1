use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::SqliteConnection;
use tracing::{debug, instrument};

use super::core::{
    from_db_timestamp, from_db_timestamp_opt, from_json, to_db_timestamp, to_json, Database,
};
use super::history::append_history;
use crate::catalog::types::{Criterion, CriterionLink, Location, Product, Vendor};
use crate::db::Row;
use crate::history::types::HistoryOperation;
use crate::store::CatalogStore;
use crate::TARGET_DB;

pub(crate) fn product_history_key(product: &Product) -> String {
    format!("product:{}:{}", product.name, product.version)
}

fn product_from_row(row: &SqliteRow) -> Result<Product, sqlx::Error> {
    Ok(Product {
        id: Some(row.try_get("id")?),
        name: row.try_get("name")?,
        version: row.try_get("version")?,
        developer: row.try_get("developer")?,
        vendor_id: row.try_get("vendor_id")?,
        api_url: row.try_get("api_url")?,
        certification_criteria: from_json(&row.try_get::<String, _>("certification_criteria")?)?,
        certification_status: row.try_get("certification_status")?,
        certification_date: from_db_timestamp_opt(row.try_get("certification_date")?)?,
        certification_edition: row.try_get("certification_edition")?,
        chpl_id: row.try_get("chpl_id")?,
        practice_type: row.try_get("practice_type")?,
        created_at: Some(from_db_timestamp(&row.try_get::<String, _>("created_at")?)?),
        updated_at: Some(from_db_timestamp(&row.try_get::<String, _>("updated_at")?)?),
    })
}

fn vendor_from_row(row: &SqliteRow) -> Result<Vendor, sqlx::Error> {
    let location: Option<String> = row.try_get("location")?;
    Ok(Vendor {
        id: Some(row.try_get("id")?),
        name: row.try_get("name")?,
        developer_code: row.try_get("developer_code")?,
        url: row.try_get("url")?,
        location: location.as_deref().map(from_json::<Location>).transpose()?,
        status: row.try_get("status")?,
        last_modified_in_chpl: from_db_timestamp_opt(row.try_get("last_modified_in_chpl")?)?,
        chpl_id: row.try_get("chpl_id")?,
        created_at: Some(from_db_timestamp(&row.try_get::<String, _>("created_at")?)?),
        updated_at: Some(from_db_timestamp(&row.try_get::<String, _>("updated_at")?)?),
    })
}

fn criterion_from_row(row: &SqliteRow) -> Result<Criterion, sqlx::Error> {
    Ok(Criterion {
        id: Some(row.try_get("id")?),
        certification_id: row.try_get("certification_id")?,
        number: row.try_get("number")?,
        title: row.try_get("title")?,
        certification_edition_id: row.try_get("certification_edition_id")?,
        certification_edition: row.try_get("certification_edition")?,
        description: row.try_get("description")?,
        removed: row.try_get("removed")?,
        created_at: Some(from_db_timestamp(&row.try_get::<String, _>("created_at")?)?),
        updated_at: Some(from_db_timestamp(&row.try_get::<String, _>("updated_at")?)?),
    })
}

async fn insert_product(
    conn: &mut SqliteConnection,
    product: &Product,
    now: DateTime<Utc>,
) -> Result<i64> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO products (
            name, version, developer, vendor_id, api_url, certification_criteria,
            certification_status, certification_date, certification_edition,
            chpl_id, practice_type, created_at, updated_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
        RETURNING id;
        "#,
    )
    .bind(&product.name)
    .bind(&product.version)
    .bind(&product.developer)
    .bind(product.vendor_id)
    .bind(&product.api_url)
    .bind(to_json(&product.certification_criteria)?)
    .bind(&product.certification_status)
    .bind(product.certification_date.map(to_db_timestamp))
    .bind(&product.certification_edition)
    .bind(&product.chpl_id)
    .bind(&product.practice_type)
    .bind(to_db_timestamp(now))
    .fetch_one(&mut *conn)
    .await
    .context("failed to insert product")?;

    append_history(
        conn,
        &product_history_key(product),
        HistoryOperation::Insert,
        &serde_json::to_vec(product)?,
        now,
    )
    .await?;
    Ok(id)
}

async fn update_product_row(
    conn: &mut SqliteConnection,
    id: i64,
    product: &Product,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE products SET
            name = ?1, version = ?2, developer = ?3, vendor_id = ?4, api_url = ?5,
            certification_criteria = ?6, certification_status = ?7,
            certification_date = ?8, certification_edition = ?9, chpl_id = ?10,
            practice_type = ?11, updated_at = ?12
        WHERE id = ?13;
        "#,
    )
    .bind(&product.name)
    .bind(&product.version)
    .bind(&product.developer)
    .bind(product.vendor_id)
    .bind(&product.api_url)
    .bind(to_json(&product.certification_criteria)?)
    .bind(&product.certification_status)
    .bind(product.certification_date.map(to_db_timestamp))
    .bind(&product.certification_edition)
    .bind(&product.chpl_id)
    .bind(&product.practice_type)
    .bind(to_db_timestamp(now))
    .bind(id)
    .execute(&mut *conn)
    .await
    .context("failed to update product")?;

    append_history(
        conn,
        &product_history_key(product),
        HistoryOperation::Update,
        &serde_json::to_vec(product)?,
        now,
    )
    .await?;
    Ok(())
}

async fn write_product_links(
    conn: &mut SqliteConnection,
    product_id: i64,
    links: &[CriterionLink],
) -> Result<()> {
    sqlx::query("DELETE FROM product_criteria WHERE product_id = ?1;")
        .bind(product_id)
        .execute(&mut *conn)
        .await
        .context("failed to delete product criteria links")?;

    for link in links {
        sqlx::query(
            r#"
            INSERT INTO product_criteria (product_id, criterion_id, criterion_number)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(product_id, criterion_id) DO UPDATE SET criterion_number = ?3;
            "#,
        )
        .bind(product_id)
        .bind(link.criterion_id)
        .bind(&link.number)
        .execute(&mut *conn)
        .await
        .context("failed to link product to criterion")?;
    }
    Ok(())
}

impl Database {
    /// Criterion links currently stored for a product, ordered by CHPL id.
    pub async fn product_criterion_links(
        &self,
        product_id: i64,
    ) -> Result<Vec<CriterionLink>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT criterion_id, criterion_number FROM product_criteria
            WHERE product_id = ?1
            ORDER BY criterion_id;
            "#,
        )
        .bind(product_id)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| {
                Ok(CriterionLink {
                    criterion_id: row.try_get("criterion_id")?,
                    number: row.try_get("criterion_number")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl CatalogStore for Database {
    #[instrument(target = "db", level = "debug", skip(self))]
    async fn get_product(&self, name: &str, version: &str) -> Result<Option<Product>> {
        let row = sqlx::query("SELECT * FROM products WHERE name = ?1 AND version = ?2;")
            .bind(name)
            .bind(version)
            .fetch_optional(self.pool())
            .await
            .context("failed to select product")?;

        Ok(row.as_ref().map(product_from_row).transpose()?)
    }

    #[instrument(target = "db", level = "info", skip(self, product), fields(product = %product.identity()))]
    async fn add_product(&self, product: &Product) -> Result<i64> {
        let mut transaction = self.pool().begin().await?;
        let id = insert_product(&mut transaction, product, Utc::now()).await?;
        transaction.commit().await?;
        debug!(target: TARGET_DB, "Inserted product {} as {}", product.identity(), id);
        Ok(id)
    }

    #[instrument(target = "db", level = "info", skip(self, product), fields(product = %product.identity()))]
    async fn update_product(&self, product: &Product) -> Result<()> {
        let id = product
            .id
            .ok_or_else(|| anyhow!("cannot update product {} without an id", product.identity()))?;
        let mut transaction = self.pool().begin().await?;
        update_product_row(&mut transaction, id, product, Utc::now()).await?;
        transaction.commit().await?;
        Ok(())
    }

    async fn delete_product_links(&self, product_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM product_criteria WHERE product_id = ?1;")
            .bind(product_id)
            .execute(self.pool())
            .await
            .context("failed to delete product criteria links")?;
        Ok(())
    }

    async fn link_product_to_criterion(
        &self,
        criterion_id: i64,
        product_id: i64,
        number: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO product_criteria (product_id, criterion_id, criterion_number)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(product_id, criterion_id) DO UPDATE SET criterion_number = ?3;
            "#,
        )
        .bind(product_id)
        .bind(criterion_id)
        .bind(number)
        .execute(self.pool())
        .await
        .context("failed to link product to criterion")?;
        Ok(())
    }

    #[instrument(target = "db", level = "debug", skip(self, links))]
    async fn replace_product_links(&self, product_id: i64, links: &[CriterionLink]) -> Result<()> {
        let mut transaction = self.pool().begin().await?;
        write_product_links(&mut transaction, product_id, links).await?;
        transaction
            .commit()
            .await
            .context("failed to replace product criteria links")?;
        Ok(())
    }

    #[instrument(target = "db", level = "info", skip(self, product, links), fields(product = %product.identity()))]
    async fn save_product_with_links(
        &self,
        product: &Product,
        links: &[CriterionLink],
    ) -> Result<i64> {
        let now = Utc::now();
        let mut transaction = self.pool().begin().await?;

        let id = match product.id {
            Some(id) => {
                update_product_row(&mut transaction, id, product, now).await?;
                id
            }
            None => insert_product(&mut transaction, product, now).await?,
        };
        write_product_links(&mut transaction, id, links).await?;

        transaction
            .commit()
            .await
            .context("failed to commit product and criteria links")?;
        debug!(target: TARGET_DB, "Saved product {} as {} with {} links", product.identity(), id, links.len());
        Ok(id)
    }

    async fn get_vendor(&self, name: &str) -> Result<Option<Vendor>> {
        let row = sqlx::query("SELECT * FROM vendors WHERE name = ?1;")
            .bind(name)
            .fetch_optional(self.pool())
            .await
            .context("failed to select vendor")?;

        Ok(row.as_ref().map(vendor_from_row).transpose()?)
    }

    #[instrument(target = "db", level = "info", skip(self, vendor), fields(vendor = %vendor.name))]
    async fn add_vendor(&self, vendor: &Vendor) -> Result<i64> {
        let location = vendor.location.as_ref().map(to_json).transpose()?;
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO vendors (
                name, developer_code, url, location, status, last_modified_in_chpl,
                chpl_id, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            RETURNING id;
            "#,
        )
        .bind(&vendor.name)
        .bind(&vendor.developer_code)
        .bind(&vendor.url)
        .bind(location)
        .bind(&vendor.status)
        .bind(vendor.last_modified_in_chpl.map(to_db_timestamp))
        .bind(vendor.chpl_id)
        .bind(to_db_timestamp(Utc::now()))
        .fetch_one(self.pool())
        .await
        .context("failed to insert vendor")?;
        Ok(id)
    }

    #[instrument(target = "db", level = "info", skip(self, vendor), fields(vendor = %vendor.name))]
    async fn update_vendor(&self, vendor: &Vendor) -> Result<()> {
        let id = vendor
            .id
            .ok_or_else(|| anyhow!("cannot update vendor {} without an id", vendor.name))?;
        let location = vendor.location.as_ref().map(to_json).transpose()?;
        sqlx::query(
            r#"
            UPDATE vendors SET
                name = ?1, developer_code = ?2, url = ?3, location = ?4, status = ?5,
                last_modified_in_chpl = ?6, chpl_id = ?7, updated_at = ?8
            WHERE id = ?9;
            "#,
        )
        .bind(&vendor.name)
        .bind(&vendor.developer_code)
        .bind(&vendor.url)
        .bind(location)
        .bind(&vendor.status)
        .bind(vendor.last_modified_in_chpl.map(to_db_timestamp))
        .bind(vendor.chpl_id)
        .bind(to_db_timestamp(Utc::now()))
        .bind(id)
        .execute(self.pool())
        .await
        .context("failed to update vendor")?;
        Ok(())
    }

    async fn get_criterion(&self, certification_id: i64) -> Result<Option<Criterion>> {
        let row = sqlx::query("SELECT * FROM criteria WHERE certification_id = ?1;")
            .bind(certification_id)
            .fetch_optional(self.pool())
            .await
            .context("failed to select criterion")?;

        Ok(row.as_ref().map(criterion_from_row).transpose()?)
    }

    async fn add_criterion(&self, criterion: &Criterion) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO criteria (
                certification_id, number, title, certification_edition_id,
                certification_edition, description, removed, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            RETURNING id;
            "#,
        )
        .bind(criterion.certification_id)
        .bind(&criterion.number)
        .bind(&criterion.title)
        .bind(criterion.certification_edition_id)
        .bind(&criterion.certification_edition)
        .bind(&criterion.description)
        .bind(criterion.removed)
        .bind(to_db_timestamp(Utc::now()))
        .fetch_one(self.pool())
        .await
        .context("failed to insert criterion")?;
        Ok(id)
    }

    async fn update_criterion(&self, criterion: &Criterion) -> Result<()> {
        let id = criterion
            .id
            .ok_or_else(|| anyhow!("cannot update criterion {} without an id", criterion.identity()))?;
        sqlx::query(
            r#"
            UPDATE criteria SET
                certification_id = ?1, number = ?2, title = ?3, certification_edition_id = ?4,
                certification_edition = ?5, description = ?6, removed = ?7, updated_at = ?8
            WHERE id = ?9;
            "#,
        )
        .bind(criterion.certification_id)
        .bind(&criterion.number)
        .bind(&criterion.title)
        .bind(criterion.certification_edition_id)
        .bind(&criterion.certification_edition)
        .bind(&criterion.description)
        .bind(criterion.removed)
        .bind(to_db_timestamp(Utc::now()))
        .bind(id)
        .execute(self.pool())
        .await
        .context("failed to update criterion")?;
        Ok(())
    }
}
