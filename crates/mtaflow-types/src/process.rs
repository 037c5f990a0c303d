//! Process-level types: step phases, async execution states, error
//! classification and operator-facing progress messages.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Phase of a step's logical attempt, persisted under `stepPhase`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepPhase {
    #[default]
    Execute,
    Poll,
    Retry,
    Wait,
    Done,
}

impl StepPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepPhase::Execute => "EXECUTE",
            StepPhase::Poll => "POLL",
            StepPhase::Retry => "RETRY",
            StepPhase::Wait => "WAIT",
            StepPhase::Done => "DONE",
        }
    }
}

impl fmt::Display for StepPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EXECUTE" => Ok(StepPhase::Execute),
            "POLL" => Ok(StepPhase::Poll),
            "RETRY" => Ok(StepPhase::Retry),
            "WAIT" => Ok(StepPhase::Wait),
            "DONE" => Ok(StepPhase::Done),
            other => Err(format!("unknown step phase: '{other}'")),
        }
    }
}

/// Result of driving one async execution unit once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AsyncExecutionState {
    Running,
    Finished,
    Error,
}

/// Classification of a terminal step failure, persisted under `errorType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    ContentError,
    CloudControllerError,
    ServiceBrokerError,
    UnknownError,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::ContentError => "CONTENT_ERROR",
            ErrorType::CloudControllerError => "CLOUD_CONTROLLER_ERROR",
            ErrorType::ServiceBrokerError => "SERVICE_BROKER_ERROR",
            ErrorType::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal status of an operation instance as seen by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationState {
    Running,
    Finished,
    Error,
    Aborted,
}

// ---------------------------------------------------------------------------
// Progress messages
// ---------------------------------------------------------------------------

/// Kind of an operator-facing progress message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressMessageType {
    TaskStartup,
    Info,
    Warning,
    Error,
}

impl ProgressMessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressMessageType::TaskStartup => "TASK_STARTUP",
            ProgressMessageType::Info => "INFO",
            ProgressMessageType::Warning => "WARNING",
            ProgressMessageType::Error => "ERROR",
        }
    }
}

impl FromStr for ProgressMessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TASK_STARTUP" => Ok(ProgressMessageType::TaskStartup),
            "INFO" => Ok(ProgressMessageType::Info),
            "WARNING" => Ok(ProgressMessageType::Warning),
            "ERROR" => Ok(ProgressMessageType::Error),
            other => Err(format!("unknown progress message type: '{other}'")),
        }
    }
}

/// A message shown to the operator while an operation runs.
///
/// `task_id` is the step name and `task_index` distinguishes repeated
/// executions of the same step within one operation instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressMessage {
    pub id: Uuid,
    pub instance_id: String,
    pub task_id: String,
    pub task_index: i64,
    pub message_type: ProgressMessageType,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ProgressMessage {
    pub fn new(
        instance_id: impl Into<String>,
        task_id: impl Into<String>,
        task_index: i64,
        message_type: ProgressMessageType,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            instance_id: instance_id.into(),
            task_id: task_id.into(),
            task_index,
            message_type,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine-side views of child process instances
// ---------------------------------------------------------------------------

/// Historic record of a (possibly still running) process instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricProcessInstance {
    pub id: String,
    pub end_time: Option<DateTime<Utc>>,
    /// Set when the instance was deleted (aborted) rather than completed.
    pub delete_reason: Option<String>,
}

/// A job of a process instance that the engine has not executed yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingJob {
    pub id: String,
    /// Present when the job failed and is waiting for an operator.
    pub exception_message: Option<String>,
}

/// Progress of one child process started for a slot of a parallel batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubProcessState {
    #[default]
    Running,
    Succeeded,
    /// Failed or aborted. A re-executed starter starts this slot again.
    Failed,
}

/// A child process instance tied to the batch slot it deploys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubProcessSlot {
    /// Position of the node in the batch, passed to the child as its index.
    pub index: usize,
    pub node: String,
    pub instance_id: String,
    #[serde(default)]
    pub state: SubProcessState,
}

impl SubProcessSlot {
    pub fn new(index: usize, node: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            index,
            node: node.into(),
            instance_id: instance_id.into(),
            state: SubProcessState::Running,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == SubProcessState::Running
    }
}
