//! Error taxonomy of the step machine.

use mtaflow_types::error::{EngineError, PlatformError, RepositoryError};
use mtaflow_types::process::{ErrorType, OperationState};
use thiserror::Error;

use crate::deploy::resolver::ResolverError;
use crate::variables::VariableError;

/// Errors surfaced by steps, async executions and the phase controller.
#[derive(Debug, Error)]
pub enum StepError {
    /// Bad or missing deployment content.
    #[error("{0}")]
    Content(String),

    #[error(transparent)]
    Variable(#[from] VariableError),

    #[error(transparent)]
    Resolver(#[from] ResolverError),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// A remote asynchronous operation reported failure.
    #[error("{0}")]
    AsyncOperationFailed(String),

    #[error("execution of step \"{step}\" has timed out after {timeout_secs} seconds")]
    Timeout { step: String, timeout_secs: u64 },

    #[error("error monitoring sub-process \"{instance_id}\": {message}")]
    Monitoring { instance_id: String, message: String },

    #[error("process was aborted")]
    Aborted,

    #[error("conflicting operation in progress for MTA \"{mta_id}\" (process \"{holder}\")")]
    ConflictingOperation { mta_id: String, holder: String },

    /// Another error with a human-readable description of what was being done.
    #[error("{context}: {source}")]
    Annotated {
        context: String,
        #[source]
        source: Box<StepError>,
    },
}

impl StepError {
    /// Prefix the error with a description of the failed activity.
    pub fn annotate(self, context: impl Into<String>) -> Self {
        let context = context.into();
        if context.is_empty() {
            return self;
        }
        StepError::Annotated {
            context,
            source: Box::new(self),
        }
    }

    /// The innermost error behind any annotations.
    pub fn root(&self) -> &StepError {
        match self {
            StepError::Annotated { source, .. } => source.root(),
            other => other,
        }
    }

    /// Classification persisted under `errorType`.
    pub fn error_type(&self) -> ErrorType {
        match self.root() {
            StepError::Content(_) | StepError::Variable(_) | StepError::Resolver(_) => ErrorType::ContentError,
            StepError::Platform(e) if e.is_service_broker_error() => ErrorType::ServiceBrokerError,
            StepError::Platform(_) => ErrorType::CloudControllerError,
            _ => ErrorType::UnknownError,
        }
    }

    /// Whether retrying the same step cannot succeed without outside intervention.
    ///
    /// Transient controller, engine and storage failures are not fatal.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self.root(),
            StepError::Platform(_) | StepError::Engine(_) | StepError::Repository(_)
        )
    }

    /// Status the operation ends in if this error terminates it.
    pub fn operation_state(&self) -> OperationState {
        match self.root() {
            StepError::Aborted => OperationState::Aborted,
            _ => OperationState::Error,
        }
    }
}
