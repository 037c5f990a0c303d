//! Cross-instance operation lock.
//!
//! Prevents two operation instances from working on the same MTA at once.
//! Acquisition never blocks: a lock held by another instance is reported back
//! to the caller, which fails the step with a conflicting-operation error.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use mtaflow_types::error::RepositoryError;

/// Outcome of [`OperationLock::try_acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockAcquisition {
    /// The lock is now (or already was) held by the requesting instance.
    Acquired,
    /// Another instance holds the lock.
    HeldBy(String),
}

/// Trait for the acquire-or-fail lock keyed by MTA id.
pub trait OperationLock: Send + Sync {
    /// Acquire the lock for `mta_id` on behalf of `instance_id`.
    /// Re-acquiring a lock the instance already holds succeeds.
    fn try_acquire(
        &self,
        mta_id: &str,
        instance_id: &str,
    ) -> impl Future<Output = Result<LockAcquisition, RepositoryError>> + Send;

    /// Release the lock if `instance_id` holds it. No-op otherwise.
    fn release(&self, mta_id: &str, instance_id: &str) -> impl Future<Output = Result<(), RepositoryError>> + Send;
}

/// Object-safe version of [`OperationLock`] with boxed futures.
pub trait OperationLockDyn: Send + Sync {
    fn try_acquire_boxed<'a>(
        &'a self,
        mta_id: &'a str,
        instance_id: &'a str,
    ) -> BoxFuture<'a, Result<LockAcquisition, RepositoryError>>;

    fn release_boxed<'a>(&'a self, mta_id: &'a str, instance_id: &'a str) -> BoxFuture<'a, Result<(), RepositoryError>>;
}

impl<T: OperationLock> OperationLockDyn for T {
    fn try_acquire_boxed<'a>(
        &'a self,
        mta_id: &'a str,
        instance_id: &'a str,
    ) -> BoxFuture<'a, Result<LockAcquisition, RepositoryError>> {
        Box::pin(self.try_acquire(mta_id, instance_id))
    }

    fn release_boxed<'a>(&'a self, mta_id: &'a str, instance_id: &'a str) -> BoxFuture<'a, Result<(), RepositoryError>> {
        Box::pin(self.release(mta_id, instance_id))
    }
}

/// Type-erased operation lock.
#[derive(Clone)]
pub struct BoxOperationLock {
    inner: Arc<dyn OperationLockDyn + Send + Sync>,
}

impl BoxOperationLock {
    pub fn new<T: OperationLock + 'static>(lock: T) -> Self {
        Self { inner: Arc::new(lock) }
    }

    pub async fn try_acquire(&self, mta_id: &str, instance_id: &str) -> Result<LockAcquisition, RepositoryError> {
        self.inner.try_acquire_boxed(mta_id, instance_id).await
    }

    pub async fn release(&self, mta_id: &str, instance_id: &str) -> Result<(), RepositoryError> {
        self.inner.release_boxed(mta_id, instance_id).await
    }
}
