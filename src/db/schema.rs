use tracing::info;

use super::core::Database;
use crate::TARGET_DB;

impl Database {
    pub(crate) async fn initialize_schema(&self) -> Result<(), sqlx::Error> {
        let mut conn = self.pool().acquire().await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vendors (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                developer_code TEXT NOT NULL,
                url TEXT NOT NULL,
                location TEXT, -- JSON
                status TEXT NOT NULL,
                last_modified_in_chpl TEXT,
                chpl_id INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS criteria (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                certification_id INTEGER NOT NULL UNIQUE,
                number TEXT NOT NULL,
                title TEXT NOT NULL,
                certification_edition_id INTEGER NOT NULL,
                certification_edition TEXT NOT NULL,
                description TEXT NOT NULL,
                removed BOOLEAN NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS products (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                version TEXT NOT NULL,
                developer TEXT NOT NULL,
                vendor_id INTEGER,
                api_url TEXT,
                certification_criteria TEXT NOT NULL, -- JSON array of CHPL criterion ids
                certification_status TEXT NOT NULL,
                certification_date TEXT,
                certification_edition TEXT NOT NULL,
                chpl_id TEXT NOT NULL,
                practice_type TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(name, version),
                FOREIGN KEY (vendor_id) REFERENCES vendors (id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_products_vendor_id ON products (vendor_id);

            CREATE TABLE IF NOT EXISTS product_criteria (
                product_id INTEGER NOT NULL,
                criterion_id INTEGER NOT NULL, -- CHPL certification id
                criterion_number TEXT NOT NULL,
                PRIMARY KEY (product_id, criterion_id),
                FOREIGN KEY (product_id) REFERENCES products (id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS organizations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                npi_id TEXT NOT NULL UNIQUE,
                primary_name TEXT NOT NULL,
                secondary_name TEXT,
                location TEXT, -- JSON
                taxonomy TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS endpoints (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL UNIQUE,
                organization_name TEXT NOT NULL,
                alternate_names TEXT NOT NULL DEFAULT '[]', -- JSON
                npi_ids TEXT NOT NULL DEFAULT '[]' -- JSON
            );

            CREATE TABLE IF NOT EXISTS organization_endpoint_links (
                organization_id TEXT NOT NULL, -- NPI id
                endpoint_url TEXT NOT NULL,
                confidence REAL NOT NULL,
                PRIMARY KEY (organization_id, endpoint_url)
            );

            CREATE TABLE IF NOT EXISTS history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_key TEXT NOT NULL,
                operation TEXT NOT NULL CHECK (operation IN ('I', 'U')),
                snapshot BLOB NOT NULL,
                entered_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_history_key_entered_at ON history (entity_key, entered_at);
            CREATE INDEX IF NOT EXISTS idx_history_entered_at ON history (entered_at);

            CREATE TABLE IF NOT EXISTS pruning_metadata (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                started_at TEXT NOT NULL,
                finished_at TEXT,
                successful BOOLEAN NOT NULL DEFAULT 0,
                rows_processed INTEGER NOT NULL DEFAULT 0,
                rows_pruned INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )
        .execute(&mut *conn)
        .await?;

        info!(target: TARGET_DB, "Database schema initialized");
        Ok(())
    }
}
