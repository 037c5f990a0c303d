//! SQLite progress message repository.

use chrono::Utc;
use mtaflow_core::repository::progress::ProgressMessageRepository;
use mtaflow_types::error::RepositoryError;
use mtaflow_types::process::{ProgressMessage, ProgressMessageType};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, query_error};

/// SQLite-backed implementation of `ProgressMessageRepository`.
pub struct SqliteProgressMessageRepository {
    pool: DatabasePool,
}

impl SqliteProgressMessageRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Delete the messages of an instance older than `cutoff`.
    pub async fn delete_older_than(
        &self,
        instance_id: &str,
        cutoff: chrono::DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM progress_messages WHERE instance_id = ? AND timestamp < ?")
            .bind(instance_id)
            .bind(format_datetime(&cutoff))
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;
        Ok(result.rows_affected())
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct ProgressMessageRow {
    id: String,
    instance_id: String,
    task_id: String,
    task_index: i64,
    message_type: String,
    text: String,
    timestamp: String,
}

impl ProgressMessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            instance_id: row.try_get("instance_id")?,
            task_id: row.try_get("task_id")?,
            task_index: row.try_get("task_index")?,
            message_type: row.try_get("message_type")?,
            text: row.try_get("text")?,
            timestamp: row.try_get("timestamp")?,
        })
    }

    fn into_message(self) -> Result<ProgressMessage, RepositoryError> {
        let id = Uuid::parse_str(&self.id).map_err(|e| RepositoryError::Query(format!("invalid id: {e}")))?;
        let message_type = self
            .message_type
            .parse::<ProgressMessageType>()
            .map_err(RepositoryError::Query)?;

        Ok(ProgressMessage {
            id,
            instance_id: self.instance_id,
            task_id: self.task_id,
            task_index: self.task_index,
            message_type,
            text: self.text,
            timestamp: parse_datetime(&self.timestamp)?,
        })
    }
}

impl ProgressMessageRepository for SqliteProgressMessageRepository {
    async fn add(&self, message: &ProgressMessage) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO progress_messages (id, instance_id, task_id, task_index, message_type, text, timestamp)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(message.id.to_string())
        .bind(&message.instance_id)
        .bind(&message.task_id)
        .bind(message.task_index)
        .bind(message.message_type.as_str())
        .bind(&message.text)
        .bind(format_datetime(&message.timestamp))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                RepositoryError::Conflict(format!("progress message {} already exists", message.id))
            }
            other => query_error(other),
        })?;
        Ok(())
    }

    async fn list_by_instance(&self, instance_id: &str) -> Result<Vec<ProgressMessage>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM progress_messages WHERE instance_id = ? ORDER BY timestamp, id")
            .bind(instance_id)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        rows.iter()
            .map(|row| {
                ProgressMessageRow::from_row(row)
                    .map_err(query_error)?
                    .into_message()
            })
            .collect()
    }

    async fn delete_by_type(
        &self,
        instance_id: &str,
        task_id: &str,
        message_type: ProgressMessageType,
    ) -> Result<u64, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM progress_messages WHERE instance_id = ? AND task_id = ? AND message_type = ?")
                .bind(instance_id)
                .bind(task_id)
                .bind(message_type.as_str())
                .execute(&self.pool.writer)
                .await
                .map_err(query_error)?;
        Ok(result.rows_affected())
    }
}
