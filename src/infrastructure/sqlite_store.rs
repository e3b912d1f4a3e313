use async_trait::async_trait;
use chrono::Utc;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};

use crate::application::{AppError, AppResult, DedupStore, TargetRepository};
use crate::domain::{
    ExternalHandle, ItemId, MonitoredTarget, NewTarget, RoleId, TargetId, UserId,
};

/// Registry and dedup state in one SQLite database.
pub struct SqliteStore {
    pool: SqlitePool,
}

type TargetRow = (i64, i64, String, i64);

impl SqliteStore {
    /// db_url examples
    /// - "sqlite:/data/postwatch.db" (docker volume)
    /// - "sqlite:postwatch.db?mode=rwc"
    /// - "sqlite::memory:" (tests; pinned to a single connection)
    pub async fn new(db_url: &str) -> AppResult<Self> {
        let max_connections = if db_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(db_url)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> AppResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS monitored_targets (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              owner_id INTEGER NOT NULL UNIQUE,
              external_handle TEXT NOT NULL,
              notify_role_id INTEGER NOT NULL,
              created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Storage(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS dedup_state (
              target_id INTEGER PRIMARY KEY,
              last_item_id TEXT NOT NULL,
              updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Storage(e.to_string()))?;

        Ok(())
    }
}

// Discord snowflakes fit in 63 bits, so the i64 round trip is lossless.
fn row_to_target((id, owner_id, handle, role_id): TargetRow) -> AppResult<MonitoredTarget> {
    Ok(MonitoredTarget {
        id: TargetId(id),
        external_handle: ExternalHandle::parse(&handle)?,
        owner_id: UserId(owner_id as u64),
        notify_role_id: RoleId(role_id as u64),
    })
}

#[async_trait]
impl TargetRepository for SqliteStore {
    async fn add(&self, target: &NewTarget) -> AppResult<TargetId> {
        let result = sqlx::query(
            r#"
            INSERT INTO monitored_targets(owner_id, external_handle, notify_role_id, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(owner_id) DO NOTHING
            "#,
        )
        .bind(target.owner_id.0 as i64)
        .bind(target.external_handle.as_str())
        .bind(target.notify_role_id.0 as i64)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Storage(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AppError::DuplicateTarget {
                owner: target.owner_id,
            });
        }
        Ok(TargetId(result.last_insert_rowid()))
    }

    async fn remove(&self, id: TargetId) -> AppResult<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;

        let result = sqlx::query("DELETE FROM monitored_targets WHERE id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;
        sqlx::query("DELETE FROM dedup_state WHERE target_id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_by_owner(&self, owner: UserId) -> AppResult<Option<MonitoredTarget>> {
        let row: Option<TargetRow> = sqlx::query_as(
            "SELECT id, owner_id, external_handle, notify_role_id FROM monitored_targets WHERE owner_id = ? LIMIT 1",
        )
        .bind(owner.0 as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Storage(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let target = row_to_target(row)?;
        if self.remove(target.id).await? {
            Ok(Some(target))
        } else {
            Ok(None)
        }
    }

    async fn list(&self) -> AppResult<Vec<MonitoredTarget>> {
        let rows: Vec<TargetRow> = sqlx::query_as(
            "SELECT id, owner_id, external_handle, notify_role_id FROM monitored_targets ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Storage(e.to_string()))?;

        rows.into_iter().map(row_to_target).collect()
    }
}

#[async_trait]
impl DedupStore for SqliteStore {
    async fn last_notified(&self, target: TargetId) -> AppResult<Option<ItemId>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT last_item_id FROM dedup_state WHERE target_id = ? LIMIT 1")
                .bind(target.0)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| AppError::Storage(e.to_string()))?;

        Ok(row.map(|r| ItemId::new(r.0)))
    }

    async fn set_last_notified(&self, target: TargetId, item: &ItemId) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO dedup_state(target_id, last_item_id, updated_at) VALUES(?, ?, ?)
            ON CONFLICT(target_id) DO UPDATE SET
              last_item_id = excluded.last_item_id,
              updated_at = excluded.updated_at
            "#,
        )
        .bind(target.0)
        .bind(item.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn clear(&self, target: TargetId) -> AppResult<()> {
        sqlx::query("DELETE FROM dedup_state WHERE target_id = ?")
            .bind(target.0)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;
        Ok(())
    }
}
