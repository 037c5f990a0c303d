//! Progress message repository trait.
//!
//! Defines the interface for persisting operator-facing progress messages.
//! Implementations live in mtaflow-infra.

use std::future::Future;

use mtaflow_types::error::RepositoryError;
use mtaflow_types::process::{ProgressMessage, ProgressMessageType};

/// Trait for progress message persistence.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait ProgressMessageRepository: Send + Sync {
    /// Append a message.
    fn add(&self, message: &ProgressMessage) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// All messages of an instance, oldest first.
    fn list_by_instance(
        &self,
        instance_id: &str,
    ) -> impl Future<Output = Result<Vec<ProgressMessage>, RepositoryError>> + Send;

    /// Delete the messages of one type reported by a step of an instance.
    /// Returns the number of deleted messages.
    fn delete_by_type(
        &self,
        instance_id: &str,
        task_id: &str,
        message_type: ProgressMessageType,
    ) -> impl Future<Output = Result<u64, RepositoryError>> + Send;
}
