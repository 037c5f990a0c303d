//! Process variable store trait.
//!
//! Defines the interface for durable, instance-scoped process variables.
//! Implementations live in mtaflow-infra (SQLite, in-memory) or in the host
//! workflow engine.

use std::collections::HashMap;
use std::future::Future;

use mtaflow_types::error::RepositoryError;
use serde_json::Value;

use crate::variables::VariableChanges;

/// Trait for instance-scoped persistent variable storage.
///
/// Stores JSON values keyed by operation instance id and variable name.
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait VariableStore: Send + Sync {
    /// Get a variable. Returns None if it does not exist.
    fn get(
        &self,
        instance_id: &str,
        name: &str,
    ) -> impl Future<Output = Result<Option<Value>, RepositoryError>> + Send;

    /// Set a variable (upsert).
    fn set(
        &self,
        instance_id: &str,
        name: &str,
        value: &Value,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Delete a variable. No-op if it does not exist.
    fn delete(
        &self,
        instance_id: &str,
        name: &str,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// List all variable names of an instance.
    fn list(
        &self,
        instance_id: &str,
    ) -> impl Future<Output = Result<Vec<String>, RepositoryError>> + Send;

    /// Load every variable of an instance.
    fn load_all(
        &self,
        instance_id: &str,
    ) -> impl Future<Output = Result<HashMap<String, Value>, RepositoryError>> + Send;

    /// Write the changes of one invocation.
    ///
    /// The default applies them one by one; stores that support transactions
    /// should override this to apply them atomically.
    fn apply(
        &self,
        instance_id: &str,
        changes: &VariableChanges,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send {
        async move {
            for (name, value) in &changes.set {
                self.set(instance_id, name, value).await?;
            }
            for name in &changes.removed {
                self.delete(instance_id, name).await?;
            }
            Ok(())
        }
    }
}
