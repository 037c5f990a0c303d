//! BoxPlatformClient -- object-safe dynamic dispatch wrapper for PlatformClient.
//!
//! 1. Define an object-safe `PlatformClientDyn` trait with boxed futures
//! 2. Blanket-impl `PlatformClientDyn` for all `T: PlatformClient`
//! 3. `BoxPlatformClient` wraps `Arc<dyn PlatformClientDyn>` and delegates

use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use mtaflow_types::error::PlatformError;
use mtaflow_types::platform::{AppState, CloudApplication, CloudServiceInstance, CloudTask, ServiceOperation};

use super::client::PlatformClient;

/// Object-safe version of [`PlatformClient`] with boxed futures.
///
/// A blanket implementation is provided for all types implementing `PlatformClient`.
pub trait PlatformClientDyn: Send + Sync {
    fn get_application_boxed<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<CloudApplication, PlatformError>>;
    fn create_application_boxed<'a>(&'a self, app: &'a CloudApplication) -> BoxFuture<'a, Result<(), PlatformError>>;
    fn update_application_boxed<'a>(&'a self, app: &'a CloudApplication) -> BoxFuture<'a, Result<(), PlatformError>>;
    fn update_application_env_boxed<'a>(
        &'a self,
        name: &'a str,
        env: &'a BTreeMap<String, String>,
    ) -> BoxFuture<'a, Result<(), PlatformError>>;
    fn delete_application_boxed<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<(), PlatformError>>;
    fn start_application_boxed<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<(), PlatformError>>;
    fn stop_application_boxed<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<(), PlatformError>>;
    fn get_application_state_boxed<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<AppState, PlatformError>>;
    fn get_recent_logs_boxed<'a>(&'a self, app_name: &'a str) -> BoxFuture<'a, Result<Vec<String>, PlatformError>>;
    fn get_service_instance_boxed<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, Result<CloudServiceInstance, PlatformError>>;
    fn create_service_instance_boxed<'a>(
        &'a self,
        service: &'a CloudServiceInstance,
    ) -> BoxFuture<'a, Result<(), PlatformError>>;
    fn delete_service_instance_boxed<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<(), PlatformError>>;
    fn get_last_service_operation_boxed<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Option<ServiceOperation>, PlatformError>>;
    fn bind_service_boxed<'a>(&'a self, app_name: &'a str, service_name: &'a str) -> BoxFuture<'a, Result<(), PlatformError>>;
    fn unbind_service_boxed<'a>(&'a self, app_name: &'a str, service_name: &'a str) -> BoxFuture<'a, Result<(), PlatformError>>;
    fn add_route_boxed<'a>(&'a self, app_name: &'a str, uri: &'a str) -> BoxFuture<'a, Result<(), PlatformError>>;
    fn delete_route_boxed<'a>(&'a self, uri: &'a str) -> BoxFuture<'a, Result<(), PlatformError>>;
    fn run_task_boxed<'a>(&'a self, app_name: &'a str, task: &'a CloudTask) -> BoxFuture<'a, Result<CloudTask, PlatformError>>;
    fn get_task_boxed<'a>(&'a self, guid: &'a str) -> BoxFuture<'a, Result<CloudTask, PlatformError>>;
}

/// Blanket implementation: any `PlatformClient` automatically implements `PlatformClientDyn`.
impl<T: PlatformClient> PlatformClientDyn for T {
    fn get_application_boxed<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<CloudApplication, PlatformError>> {
        Box::pin(self.get_application(name))
    }

    fn create_application_boxed<'a>(&'a self, app: &'a CloudApplication) -> BoxFuture<'a, Result<(), PlatformError>> {
        Box::pin(self.create_application(app))
    }

    fn update_application_boxed<'a>(&'a self, app: &'a CloudApplication) -> BoxFuture<'a, Result<(), PlatformError>> {
        Box::pin(self.update_application(app))
    }

    fn update_application_env_boxed<'a>(
        &'a self,
        name: &'a str,
        env: &'a BTreeMap<String, String>,
    ) -> BoxFuture<'a, Result<(), PlatformError>> {
        Box::pin(self.update_application_env(name, env))
    }

    fn delete_application_boxed<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<(), PlatformError>> {
        Box::pin(self.delete_application(name))
    }

    fn start_application_boxed<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<(), PlatformError>> {
        Box::pin(self.start_application(name))
    }

    fn stop_application_boxed<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<(), PlatformError>> {
        Box::pin(self.stop_application(name))
    }

    fn get_application_state_boxed<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<AppState, PlatformError>> {
        Box::pin(self.get_application_state(name))
    }

    fn get_recent_logs_boxed<'a>(&'a self, app_name: &'a str) -> BoxFuture<'a, Result<Vec<String>, PlatformError>> {
        Box::pin(self.get_recent_logs(app_name))
    }

    fn get_service_instance_boxed<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, Result<CloudServiceInstance, PlatformError>> {
        Box::pin(self.get_service_instance(name))
    }

    fn create_service_instance_boxed<'a>(
        &'a self,
        service: &'a CloudServiceInstance,
    ) -> BoxFuture<'a, Result<(), PlatformError>> {
        Box::pin(self.create_service_instance(service))
    }

    fn delete_service_instance_boxed<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<(), PlatformError>> {
        Box::pin(self.delete_service_instance(name))
    }

    fn get_last_service_operation_boxed<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Option<ServiceOperation>, PlatformError>> {
        Box::pin(self.get_last_service_operation(name))
    }

    fn bind_service_boxed<'a>(&'a self, app_name: &'a str, service_name: &'a str) -> BoxFuture<'a, Result<(), PlatformError>> {
        Box::pin(self.bind_service(app_name, service_name))
    }

    fn unbind_service_boxed<'a>(&'a self, app_name: &'a str, service_name: &'a str) -> BoxFuture<'a, Result<(), PlatformError>> {
        Box::pin(self.unbind_service(app_name, service_name))
    }

    fn add_route_boxed<'a>(&'a self, app_name: &'a str, uri: &'a str) -> BoxFuture<'a, Result<(), PlatformError>> {
        Box::pin(self.add_route(app_name, uri))
    }

    fn delete_route_boxed<'a>(&'a self, uri: &'a str) -> BoxFuture<'a, Result<(), PlatformError>> {
        Box::pin(self.delete_route(uri))
    }

    fn run_task_boxed<'a>(&'a self, app_name: &'a str, task: &'a CloudTask) -> BoxFuture<'a, Result<CloudTask, PlatformError>> {
        Box::pin(self.run_task(app_name, task))
    }

    fn get_task_boxed<'a>(&'a self, guid: &'a str) -> BoxFuture<'a, Result<CloudTask, PlatformError>> {
        Box::pin(self.get_task(guid))
    }
}

/// Type-erased platform client shared by all steps of a runner.
///
/// Since `PlatformClient` uses RPITIT, it cannot be used as a trait object
/// directly. `BoxPlatformClient` provides equivalent methods that delegate to
/// the inner `PlatformClientDyn` trait object. Cloning is cheap.
#[derive(Clone)]
pub struct BoxPlatformClient {
    inner: Arc<dyn PlatformClientDyn + Send + Sync>,
}

impl BoxPlatformClient {
    /// Wrap a concrete `PlatformClient` in a type-erased handle.
    pub fn new<T: PlatformClient + 'static>(client: T) -> Self {
        Self {
            inner: Arc::new(client),
        }
    }

    pub async fn get_application(&self, name: &str) -> Result<CloudApplication, PlatformError> {
        self.inner.get_application_boxed(name).await
    }

    pub async fn create_application(&self, app: &CloudApplication) -> Result<(), PlatformError> {
        self.inner.create_application_boxed(app).await
    }

    pub async fn update_application(&self, app: &CloudApplication) -> Result<(), PlatformError> {
        self.inner.update_application_boxed(app).await
    }

    pub async fn update_application_env(
        &self,
        name: &str,
        env: &BTreeMap<String, String>,
    ) -> Result<(), PlatformError> {
        self.inner.update_application_env_boxed(name, env).await
    }

    pub async fn delete_application(&self, name: &str) -> Result<(), PlatformError> {
        self.inner.delete_application_boxed(name).await
    }

    pub async fn start_application(&self, name: &str) -> Result<(), PlatformError> {
        self.inner.start_application_boxed(name).await
    }

    pub async fn stop_application(&self, name: &str) -> Result<(), PlatformError> {
        self.inner.stop_application_boxed(name).await
    }

    pub async fn get_application_state(&self, name: &str) -> Result<AppState, PlatformError> {
        self.inner.get_application_state_boxed(name).await
    }

    pub async fn get_recent_logs(&self, app_name: &str) -> Result<Vec<String>, PlatformError> {
        self.inner.get_recent_logs_boxed(app_name).await
    }

    pub async fn get_service_instance(&self, name: &str) -> Result<CloudServiceInstance, PlatformError> {
        self.inner.get_service_instance_boxed(name).await
    }

    pub async fn create_service_instance(&self, service: &CloudServiceInstance) -> Result<(), PlatformError> {
        self.inner.create_service_instance_boxed(service).await
    }

    pub async fn delete_service_instance(&self, name: &str) -> Result<(), PlatformError> {
        self.inner.delete_service_instance_boxed(name).await
    }

    pub async fn get_last_service_operation(&self, name: &str) -> Result<Option<ServiceOperation>, PlatformError> {
        self.inner.get_last_service_operation_boxed(name).await
    }

    pub async fn bind_service(&self, app_name: &str, service_name: &str) -> Result<(), PlatformError> {
        self.inner.bind_service_boxed(app_name, service_name).await
    }

    pub async fn unbind_service(&self, app_name: &str, service_name: &str) -> Result<(), PlatformError> {
        self.inner.unbind_service_boxed(app_name, service_name).await
    }

    pub async fn add_route(&self, app_name: &str, uri: &str) -> Result<(), PlatformError> {
        self.inner.add_route_boxed(app_name, uri).await
    }

    pub async fn delete_route(&self, uri: &str) -> Result<(), PlatformError> {
        self.inner.delete_route_boxed(uri).await
    }

    pub async fn run_task(&self, app_name: &str, task: &CloudTask) -> Result<CloudTask, PlatformError> {
        self.inner.run_task_boxed(app_name, task).await
    }

    pub async fn get_task(&self, guid: &str) -> Result<CloudTask, PlatformError> {
        self.inner.get_task_boxed(guid).await
    }
}
