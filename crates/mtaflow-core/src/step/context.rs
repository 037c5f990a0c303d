//! Per-invocation execution context handed to step bodies.

use mtaflow_types::process::{ProgressMessage, ProgressMessageType};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::engine::BoxProcessEngine;
use crate::lock::BoxOperationLock;
use crate::platform::BoxPlatformClient;
use crate::variables::{Variable, VariableChanges, VariableError, VariableSet};
use crate::vars;

/// External collaborators injected into every step invocation.
#[derive(Clone)]
pub struct Collaborators {
    pub platform: BoxPlatformClient,
    pub engine: BoxProcessEngine,
    pub lock: BoxOperationLock,
}

impl Collaborators {
    pub fn new(platform: BoxPlatformClient, engine: BoxProcessEngine, lock: BoxOperationLock) -> Self {
        Self { platform, engine, lock }
    }
}

/// Progress messages produced during one invocation, flushed by the runner.
#[derive(Debug, Default)]
pub struct ProgressBatch {
    /// Delete this step's earlier ERROR messages before adding new ones.
    pub clear_previous_errors: bool,
    pub messages: Vec<ProgressMessage>,
}

/// Everything a step can see and change during one invocation.
///
/// The variable set is a snapshot of the durable process variables; steps
/// keep no state of their own between invocations.
pub struct ProcessContext {
    instance_id: String,
    step_name: String,
    variables: VariableSet,
    collaborators: Collaborators,
    progress: ProgressBatch,
}

impl ProcessContext {
    pub fn new(
        instance_id: impl Into<String>,
        step_name: impl Into<String>,
        variables: VariableSet,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            step_name: step_name.into(),
            variables,
            collaborators,
            progress: ProgressBatch::default(),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn step_name(&self) -> &str {
        &self.step_name
    }

    // -- variables ----------------------------------------------------------

    pub fn vars(&self) -> &VariableSet {
        &self.variables
    }

    pub fn vars_mut(&mut self) -> &mut VariableSet {
        &mut self.variables
    }

    pub fn get<T: DeserializeOwned>(&self, var: &Variable<T>) -> Result<Option<T>, VariableError> {
        self.variables.get(var)
    }

    pub fn require<T: DeserializeOwned>(&self, var: &Variable<T>) -> Result<T, VariableError> {
        self.variables.require(var)
    }

    pub fn set<T: Serialize>(&mut self, var: &Variable<T>, value: T) -> Result<(), VariableError> {
        self.variables.set(var, value)
    }

    pub fn remove<T>(&mut self, var: &Variable<T>) {
        self.variables.remove(var)
    }

    pub fn take_variable_changes(&mut self) -> VariableChanges {
        self.variables.take_changes()
    }

    // -- collaborators ------------------------------------------------------

    pub fn platform(&self) -> &BoxPlatformClient {
        &self.collaborators.platform
    }

    pub fn engine(&self) -> &BoxProcessEngine {
        &self.collaborators.engine
    }

    pub fn lock(&self) -> &BoxOperationLock {
        &self.collaborators.lock
    }

    // -- progress messages --------------------------------------------------

    pub fn task_startup(&mut self, text: impl Into<String>) {
        self.push_message(ProgressMessageType::TaskStartup, text.into());
    }

    pub fn info(&mut self, text: impl Into<String>) {
        let text = text.into();
        tracing::info!(instance_id = %self.instance_id, step = %self.step_name, "{text}");
        self.push_message(ProgressMessageType::Info, text);
    }

    pub fn warn(&mut self, text: impl Into<String>) {
        let text = text.into();
        tracing::warn!(instance_id = %self.instance_id, step = %self.step_name, "{text}");
        self.push_message(ProgressMessageType::Warning, text);
    }

    pub fn error(&mut self, text: impl Into<String>) {
        let text = text.into();
        tracing::error!(instance_id = %self.instance_id, step = %self.step_name, "{text}");
        self.push_message(ProgressMessageType::Error, text);
    }

    /// Only written to the trace log, never shown to the operator.
    pub fn debug(&self, text: &str) {
        tracing::debug!(instance_id = %self.instance_id, step = %self.step_name, "{text}");
    }

    pub(crate) fn clear_previous_errors(&mut self) {
        self.progress.clear_previous_errors = true;
    }

    pub fn take_progress(&mut self) -> ProgressBatch {
        std::mem::take(&mut self.progress)
    }

    pub fn progress_messages(&self) -> &[ProgressMessage] {
        &self.progress.messages
    }

    fn push_message(&mut self, message_type: ProgressMessageType, text: String) {
        let task_index = self
            .variables
            .get(&vars::TASK_INDEX)
            .ok()
            .flatten()
            .unwrap_or_default();
        self.progress.messages.push(ProgressMessage::new(
            &self.instance_id,
            &self.step_name,
            task_index,
            message_type,
            text,
        ));
    }
}
