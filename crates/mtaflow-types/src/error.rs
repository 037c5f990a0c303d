use thiserror::Error;

/// Errors from repository operations (used by trait definitions in mtaflow-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Error reported by the remote cloud platform client.
///
/// The HTTP-like status code is preserved so callers can distinguish
/// "not found", "forbidden", "conflict" and service broker failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("controller operation failed: {status} {description}")]
pub struct PlatformError {
    pub status: u16,
    pub description: String,
}

impl PlatformError {
    pub const NOT_FOUND: u16 = 404;
    pub const FORBIDDEN: u16 = 403;
    pub const CONFLICT: u16 = 409;
    pub const BAD_GATEWAY: u16 = 502;

    pub fn new(status: u16, description: impl Into<String>) -> Self {
        Self {
            status,
            description: description.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Self::NOT_FOUND
    }

    pub fn is_forbidden(&self) -> bool {
        self.status == Self::FORBIDDEN
    }

    pub fn is_conflict(&self) -> bool {
        self.status == Self::CONFLICT
    }

    /// Service brokers surface their failures through the controller as 502.
    pub fn is_service_broker_error(&self) -> bool {
        self.status == Self::BAD_GATEWAY
    }
}

/// Errors from the workflow engine facade.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("process definition '{0}' not found")]
    DefinitionNotFound(String),

    #[error("process instance '{0}' not found")]
    InstanceNotFound(String),

    #[error("engine error: {0}")]
    Internal(String),
}

/// Errors from parsing or validating orchestrator configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
