//! SQLite operation lock: one row per MTA naming the holding instance.

use chrono::Utc;
use mtaflow_core::lock::{LockAcquisition, OperationLock};
use mtaflow_types::error::RepositoryError;
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, query_error};

/// SQLite-backed implementation of `OperationLock`.
pub struct SqliteOperationLock {
    pool: DatabasePool,
}

impl SqliteOperationLock {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

impl OperationLock for SqliteOperationLock {
    async fn try_acquire(&self, mta_id: &str, instance_id: &str) -> Result<LockAcquisition, RepositoryError> {
        sqlx::query(
            r#"INSERT INTO operation_locks (mta_id, instance_id, acquired_at)
               VALUES (?, ?, ?)
               ON CONFLICT (mta_id) DO NOTHING"#,
        )
        .bind(mta_id)
        .bind(instance_id)
        .bind(format_datetime(&Utc::now()))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        // Read back on the writer so the row just inserted is visible.
        let row = sqlx::query("SELECT instance_id FROM operation_locks WHERE mta_id = ?")
            .bind(mta_id)
            .fetch_one(&self.pool.writer)
            .await
            .map_err(query_error)?;
        let holder: String = row.try_get("instance_id").map_err(query_error)?;

        if holder == instance_id {
            Ok(LockAcquisition::Acquired)
        } else {
            tracing::debug!(mta_id, holder = %holder, "operation lock held by another instance");
            Ok(LockAcquisition::HeldBy(holder))
        }
    }

    async fn release(&self, mta_id: &str, instance_id: &str) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM operation_locks WHERE mta_id = ? AND instance_id = ?")
            .bind(mta_id)
            .bind(instance_id)
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;
        Ok(())
    }
}
