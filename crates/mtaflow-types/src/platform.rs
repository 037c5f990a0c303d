//! Cloud platform resources as seen through the remote platform client.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Application definition pushed to the platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloudApplication {
    pub name: String,
    #[serde(default = "default_instances")]
    pub instances: u32,
    #[serde(default)]
    pub memory_mb: Option<u32>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Names of service instances the application binds to.
    #[serde(default)]
    pub services: Vec<String>,
    /// Route URIs mapped to the application (`host.domain/path`).
    #[serde(default)]
    pub routes: Vec<String>,
}

fn default_instances() -> u32 {
    1
}

/// Aggregated runtime state of an application's instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppState {
    Staging,
    Starting,
    Running,
    Crashed,
    Stopped,
}

/// Service instance definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloudServiceInstance {
    pub name: String,
    /// Service offering label, e.g. "postgresql".
    pub label: String,
    pub plan: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
    /// Optional services may fail to be created without failing the operation.
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceOperationType {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceOperationState {
    InProgress,
    Succeeded,
    Failed,
}

/// Last operation the service broker performed on a service instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceOperation {
    pub op_type: ServiceOperationType,
    pub state: ServiceOperationState,
    pub description: Option<String>,
}

impl ServiceOperation {
    pub fn new(op_type: ServiceOperationType, state: ServiceOperationState) -> Self {
        Self {
            op_type,
            state,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Canceling,
}

/// One-off task executed in the context of an application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudTask {
    /// Assigned by the platform when the task is started.
    #[serde(default)]
    pub guid: Option<String>,
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub state: Option<TaskState>,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

impl CloudTask {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            guid: None,
            name: name.into(),
            command: command.into(),
            state: None,
            failure_reason: None,
        }
    }
}
