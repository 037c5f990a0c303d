//! Workflow engine facade used to start and observe child process instances.
//!
//! Follows the same blanket-impl pattern as [`BoxPlatformClient`]:
//! an RPITIT trait for implementors, an object-safe `ProcessEngineDyn` mirror
//! and a cheap-to-clone `BoxProcessEngine` handle for the steps.
//!
//! [`BoxPlatformClient`]: crate::platform::BoxPlatformClient

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use mtaflow_types::error::EngineError;
use mtaflow_types::process::{HistoricProcessInstance, PendingJob};

/// Trait for the host workflow engine.
pub trait ProcessEngine: Send + Sync {
    /// Start a new instance of `definition_key` seeded with `variables`.
    /// Returns the new instance id.
    fn start_instance(
        &self,
        definition_key: &str,
        variables: &HashMap<String, Value>,
    ) -> impl Future<Output = Result<String, EngineError>> + Send;

    /// Historic record of an instance; `None` if the engine does not know it yet.
    fn historic_instance(
        &self,
        instance_id: &str,
    ) -> impl Future<Output = Result<Option<HistoricProcessInstance>, EngineError>> + Send;

    /// First job of the instance that has not been executed yet.
    fn pending_job(
        &self,
        instance_id: &str,
    ) -> impl Future<Output = Result<Option<PendingJob>, EngineError>> + Send;

    /// Final value of a variable of a (finished) instance.
    fn historic_variable(
        &self,
        instance_id: &str,
        name: &str,
    ) -> impl Future<Output = Result<Option<Value>, EngineError>> + Send;
}

/// Object-safe version of [`ProcessEngine`] with boxed futures.
pub trait ProcessEngineDyn: Send + Sync {
    fn start_instance_boxed<'a>(
        &'a self,
        definition_key: &'a str,
        variables: &'a HashMap<String, Value>,
    ) -> BoxFuture<'a, Result<String, EngineError>>;

    fn historic_instance_boxed<'a>(
        &'a self,
        instance_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<HistoricProcessInstance>, EngineError>>;

    fn pending_job_boxed<'a>(&'a self, instance_id: &'a str) -> BoxFuture<'a, Result<Option<PendingJob>, EngineError>>;

    fn historic_variable_boxed<'a>(
        &'a self,
        instance_id: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Option<Value>, EngineError>>;
}

impl<T: ProcessEngine> ProcessEngineDyn for T {
    fn start_instance_boxed<'a>(
        &'a self,
        definition_key: &'a str,
        variables: &'a HashMap<String, Value>,
    ) -> BoxFuture<'a, Result<String, EngineError>> {
        Box::pin(self.start_instance(definition_key, variables))
    }

    fn historic_instance_boxed<'a>(
        &'a self,
        instance_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<HistoricProcessInstance>, EngineError>> {
        Box::pin(self.historic_instance(instance_id))
    }

    fn pending_job_boxed<'a>(&'a self, instance_id: &'a str) -> BoxFuture<'a, Result<Option<PendingJob>, EngineError>> {
        Box::pin(self.pending_job(instance_id))
    }

    fn historic_variable_boxed<'a>(
        &'a self,
        instance_id: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Option<Value>, EngineError>> {
        Box::pin(self.historic_variable(instance_id, name))
    }
}

/// Type-erased engine facade.
#[derive(Clone)]
pub struct BoxProcessEngine {
    inner: Arc<dyn ProcessEngineDyn + Send + Sync>,
}

impl BoxProcessEngine {
    pub fn new<T: ProcessEngine + 'static>(engine: T) -> Self {
        Self {
            inner: Arc::new(engine),
        }
    }

    pub async fn start_instance(
        &self,
        definition_key: &str,
        variables: &HashMap<String, Value>,
    ) -> Result<String, EngineError> {
        self.inner.start_instance_boxed(definition_key, variables).await
    }

    pub async fn historic_instance(&self, instance_id: &str) -> Result<Option<HistoricProcessInstance>, EngineError> {
        self.inner.historic_instance_boxed(instance_id).await
    }

    pub async fn pending_job(&self, instance_id: &str) -> Result<Option<PendingJob>, EngineError> {
        self.inner.pending_job_boxed(instance_id).await
    }

    pub async fn historic_variable(&self, instance_id: &str, name: &str) -> Result<Option<Value>, EngineError> {
        self.inner.historic_variable_boxed(instance_id, name).await
    }
}
