//! Platform client trait.
//!
//! A narrow view of the cloud controller APIs (applications, service
//! instances, routes, tasks, logs). Implementations live outside this
//! workspace; errors carry the controller's status code.

use std::collections::BTreeMap;
use std::future::Future;

use mtaflow_types::error::PlatformError;
use mtaflow_types::platform::{AppState, CloudApplication, CloudServiceInstance, CloudTask, ServiceOperation};

/// Trait for the remote cloud platform.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
/// For dynamic dispatch, use [`BoxPlatformClient`](super::BoxPlatformClient).
pub trait PlatformClient: Send + Sync {
    // -- applications -------------------------------------------------------

    fn get_application(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<CloudApplication, PlatformError>> + Send;

    fn create_application(
        &self,
        app: &CloudApplication,
    ) -> impl Future<Output = Result<(), PlatformError>> + Send;

    fn update_application(
        &self,
        app: &CloudApplication,
    ) -> impl Future<Output = Result<(), PlatformError>> + Send;

    fn update_application_env(
        &self,
        name: &str,
        env: &BTreeMap<String, String>,
    ) -> impl Future<Output = Result<(), PlatformError>> + Send;

    fn delete_application(&self, name: &str) -> impl Future<Output = Result<(), PlatformError>> + Send;

    fn start_application(&self, name: &str) -> impl Future<Output = Result<(), PlatformError>> + Send;

    fn stop_application(&self, name: &str) -> impl Future<Output = Result<(), PlatformError>> + Send;

    fn get_application_state(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<AppState, PlatformError>> + Send;

    fn get_recent_logs(
        &self,
        app_name: &str,
    ) -> impl Future<Output = Result<Vec<String>, PlatformError>> + Send;

    // -- services -----------------------------------------------------------

    fn get_service_instance(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<CloudServiceInstance, PlatformError>> + Send;

    fn create_service_instance(
        &self,
        service: &CloudServiceInstance,
    ) -> impl Future<Output = Result<(), PlatformError>> + Send;

    fn delete_service_instance(&self, name: &str) -> impl Future<Output = Result<(), PlatformError>> + Send;

    /// Last operation of a service instance; `None` if the broker reports none.
    fn get_last_service_operation(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<ServiceOperation>, PlatformError>> + Send;

    fn bind_service(
        &self,
        app_name: &str,
        service_name: &str,
    ) -> impl Future<Output = Result<(), PlatformError>> + Send;

    fn unbind_service(
        &self,
        app_name: &str,
        service_name: &str,
    ) -> impl Future<Output = Result<(), PlatformError>> + Send;

    // -- routes -------------------------------------------------------------

    fn add_route(&self, app_name: &str, uri: &str) -> impl Future<Output = Result<(), PlatformError>> + Send;

    fn delete_route(&self, uri: &str) -> impl Future<Output = Result<(), PlatformError>> + Send;

    // -- tasks --------------------------------------------------------------

    /// Start a one-off task; the returned task carries the assigned guid.
    fn run_task(
        &self,
        app_name: &str,
        task: &CloudTask,
    ) -> impl Future<Output = Result<CloudTask, PlatformError>> + Send;

    fn get_task(&self, guid: &str) -> impl Future<Output = Result<CloudTask, PlatformError>> + Send;
}
