//! SQLite process variable store.
//!
//! Implements `VariableStore` from `mtaflow-core`. Values are stored as JSON
//! text and deserialized on read; the changes of one step invocation are
//! written in a single transaction.

use std::collections::HashMap;

use chrono::Utc;
use mtaflow_core::store::VariableStore;
use mtaflow_core::variables::VariableChanges;
use mtaflow_types::error::RepositoryError;
use serde_json::Value;
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, query_error};

const UPSERT: &str = r#"INSERT INTO process_variables (instance_id, name, value, updated_at)
   VALUES (?, ?, ?, ?)
   ON CONFLICT (instance_id, name) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at"#;

const DELETE: &str = "DELETE FROM process_variables WHERE instance_id = ? AND name = ?";

/// SQLite-backed implementation of `VariableStore`.
pub struct SqliteVariableStore {
    pool: DatabasePool,
}

impl SqliteVariableStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Delete every variable of a finished instance.
    pub async fn delete_instance(&self, instance_id: &str) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM process_variables WHERE instance_id = ?")
            .bind(instance_id)
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;
        Ok(result.rows_affected())
    }
}

fn decode(name: &str, raw: &str) -> Result<Value, RepositoryError> {
    serde_json::from_str(raw).map_err(|e| RepositoryError::Query(format!("invalid JSON in variable '{name}': {e}")))
}

fn encode(value: &Value) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|e| RepositoryError::Query(format!("failed to serialize value: {e}")))
}

impl VariableStore for SqliteVariableStore {
    async fn get(&self, instance_id: &str, name: &str) -> Result<Option<Value>, RepositoryError> {
        let row = sqlx::query("SELECT value FROM process_variables WHERE instance_id = ? AND name = ?")
            .bind(instance_id)
            .bind(name)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let raw: String = row.try_get("value").map_err(query_error)?;
                Ok(Some(decode(name, &raw)?))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, instance_id: &str, name: &str, value: &Value) -> Result<(), RepositoryError> {
        sqlx::query(UPSERT)
            .bind(instance_id)
            .bind(name)
            .bind(encode(value)?)
            .bind(format_datetime(&Utc::now()))
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;
        Ok(())
    }

    async fn delete(&self, instance_id: &str, name: &str) -> Result<(), RepositoryError> {
        sqlx::query(DELETE)
            .bind(instance_id)
            .bind(name)
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;
        Ok(())
    }

    async fn list(&self, instance_id: &str) -> Result<Vec<String>, RepositoryError> {
        let rows = sqlx::query("SELECT name FROM process_variables WHERE instance_id = ? ORDER BY name")
            .bind(instance_id)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        let mut names = Vec::with_capacity(rows.len());
        for row in &rows {
            names.push(row.try_get("name").map_err(query_error)?);
        }
        Ok(names)
    }

    async fn load_all(&self, instance_id: &str) -> Result<HashMap<String, Value>, RepositoryError> {
        let rows = sqlx::query("SELECT name, value FROM process_variables WHERE instance_id = ?")
            .bind(instance_id)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        let mut values = HashMap::with_capacity(rows.len());
        for row in &rows {
            let name: String = row.try_get("name").map_err(query_error)?;
            let raw: String = row.try_get("value").map_err(query_error)?;
            let value = decode(&name, &raw)?;
            values.insert(name, value);
        }
        Ok(values)
    }

    async fn apply(&self, instance_id: &str, changes: &VariableChanges) -> Result<(), RepositoryError> {
        if changes.is_empty() {
            return Ok(());
        }
        let now = format_datetime(&Utc::now());
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;

        for (name, value) in &changes.set {
            sqlx::query(UPSERT)
                .bind(instance_id)
                .bind(name)
                .bind(encode(value)?)
                .bind(&now)
                .execute(&mut *tx)
                .await
                .map_err(query_error)?;
        }
        for name in &changes.removed {
            sqlx::query(DELETE)
                .bind(instance_id)
                .bind(name)
                .execute(&mut *tx)
                .await
                .map_err(query_error)?;
        }

        tx.commit().await.map_err(query_error)?;
        tracing::trace!(
            instance_id,
            set = changes.set.len(),
            removed = changes.removed.len(),
            "applied variable changes"
        );
        Ok(())
    }
}
