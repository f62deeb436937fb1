use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::SqliteConnection;
use tracing::{debug, instrument};

use super::core::{from_db_timestamp, from_db_timestamp_opt, to_db_timestamp, Database};
use crate::db::Row;
use crate::history::types::{
    HistoryOperation, HistoryRow, HistoryWindow, PruningOutcome, PruningRun,
};
use crate::store::HistoryStore;
use crate::TARGET_DB;

// an unbounded window still binds a lower bound
const EPOCH: &str = "0000-01-01T00:00:00.000000Z";

fn window_start(window: &HistoryWindow) -> String {
    window
        .since
        .map(to_db_timestamp)
        .unwrap_or_else(|| EPOCH.to_string())
}

/// Append a history row on an open connection or transaction.
pub(crate) async fn append_history(
    conn: &mut SqliteConnection,
    entity_key: &str,
    operation: HistoryOperation,
    snapshot: &[u8],
    entered_at: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        INSERT INTO history (entity_key, operation, snapshot, entered_at)
        VALUES (?1, ?2, ?3, ?4)
        RETURNING id;
        "#,
    )
    .bind(entity_key)
    .bind(operation.code())
    .bind(snapshot)
    .bind(to_db_timestamp(entered_at))
    .fetch_one(conn)
    .await
}

fn history_row_from_row(row: &SqliteRow) -> Result<HistoryRow, sqlx::Error> {
    let code: String = row.try_get("operation")?;
    let operation = HistoryOperation::from_code(&code).ok_or_else(|| {
        sqlx::Error::Decode(format!("unknown history operation '{}'", code).into())
    })?;
    Ok(HistoryRow {
        id: row.try_get("id")?,
        entity_key: row.try_get("entity_key")?,
        operation,
        snapshot: row.try_get("snapshot")?,
        entered_at: from_db_timestamp(&row.try_get::<String, _>("entered_at")?)?,
    })
}

fn pruning_run_from_row(row: &SqliteRow) -> Result<PruningRun, sqlx::Error> {
    Ok(PruningRun {
        id: row.try_get("id")?,
        started_at: from_db_timestamp(&row.try_get::<String, _>("started_at")?)?,
        finished_at: from_db_timestamp_opt(row.try_get("finished_at")?)?,
        successful: row.try_get("successful")?,
        rows_processed: row.try_get("rows_processed")?,
        rows_pruned: row.try_get("rows_pruned")?,
    })
}

#[async_trait]
impl HistoryStore for Database {
    async fn record_history(
        &self,
        entity_key: &str,
        operation: HistoryOperation,
        snapshot: &[u8],
        entered_at: DateTime<Utc>,
    ) -> Result<i64> {
        let mut conn = self.pool().acquire().await?;
        append_history(&mut conn, entity_key, operation, snapshot, entered_at)
            .await
            .context("failed to append history row")
    }

    #[instrument(target = "db", level = "info", skip(self))]
    async fn history_keys(&self, window: &HistoryWindow) -> Result<Vec<String>> {
        let keys = sqlx::query_scalar(
            r#"
            SELECT DISTINCT entity_key FROM history
            WHERE entered_at >= ?1
            ORDER BY entity_key;
            "#,
        )
        .bind(window_start(window))
        .fetch_all(self.pool())
        .await
        .context("failed to list history keys")?;
        Ok(keys)
    }

    async fn history_rows(
        &self,
        entity_key: &str,
        window: &HistoryWindow,
    ) -> Result<Vec<HistoryRow>> {
        let rows = sqlx::query(
            r#"
            SELECT id, entity_key, operation, snapshot, entered_at FROM history
            WHERE entity_key = ?1 AND entered_at >= ?2
            ORDER BY entered_at, id;
            "#,
        )
        .bind(entity_key)
        .bind(window_start(window))
        .fetch_all(self.pool())
        .await
        .context("failed to read history rows")?;

        Ok(rows
            .iter()
            .map(history_row_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn delete_history_row(&self, id: i64) -> Result<()> {
        // insert rows are never pruned
        let deleted = sqlx::query("DELETE FROM history WHERE id = ?1 AND operation = 'U';")
            .bind(id)
            .execute(self.pool())
            .await
            .context("failed to delete history row")?
            .rows_affected();

        if deleted == 0 {
            return Err(anyhow!("history row {} is not a deletable update row", id));
        }
        debug!(target: TARGET_DB, "Deleted history row {}", id);
        Ok(())
    }

    async fn last_pruning_run(&self) -> Result<Option<PruningRun>> {
        let row = sqlx::query("SELECT * FROM pruning_metadata ORDER BY id DESC LIMIT 1;")
            .fetch_optional(self.pool())
            .await
            .context("failed to read pruning metadata")?;
        Ok(row.as_ref().map(pruning_run_from_row).transpose()?)
    }

    async fn start_pruning_run(&self, started_at: DateTime<Utc>) -> Result<i64> {
        let id = sqlx::query_scalar(
            "INSERT INTO pruning_metadata (started_at) VALUES (?1) RETURNING id;",
        )
        .bind(to_db_timestamp(started_at))
        .fetch_one(self.pool())
        .await
        .context("failed to record pruning run start")?;
        Ok(id)
    }

    async fn finish_pruning_run(
        &self,
        run_id: i64,
        finished_at: DateTime<Utc>,
        outcome: &PruningOutcome,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE pruning_metadata SET
                finished_at = ?1, successful = ?2, rows_processed = ?3, rows_pruned = ?4
            WHERE id = ?5;
            "#,
        )
        .bind(to_db_timestamp(finished_at))
        .bind(outcome.successful)
        .bind(outcome.rows_processed as i64)
        .bind(outcome.rows_pruned as i64)
        .bind(run_id)
        .execute(self.pool())
        .await
        .context("failed to record pruning run result")?;
        Ok(())
    }
}
