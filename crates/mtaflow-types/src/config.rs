//! Orchestrator configuration types.
//!
//! `OrchestratorConfig` represents the `mtaflow.toml` file that controls how
//! step failures are surfaced to the engine and how long async steps may poll.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How the phase controller reports a failed EXECUTE or POLL to the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorConvention {
    /// Persist RETRY and return the error; the engine fails the job and an
    /// operator retries it. A persisted RETRY restarts at EXECUTE.
    #[default]
    Propagate,
    /// Persist RETRY and report a resumable outcome; the engine re-invokes the
    /// step automatically, which re-runs the primary body.
    PersistRetry,
}

/// Top-level configuration for the orchestrator.
///
/// Loaded from `{data_dir}/mtaflow.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub error_convention: ErrorConvention,

    /// Timeout applied to async steps that do not declare their own.
    #[serde(default = "default_step_timeout_secs")]
    pub default_step_timeout_secs: u64,

    /// Per-step timeout overrides, keyed by step name.
    #[serde(default)]
    pub step_timeouts: HashMap<String, u64>,

    /// Delay the host engine should wait between two POLL invocations.
    #[serde(default = "default_polling_interval_secs")]
    pub polling_interval_secs: u64,

    /// SQLite URL; defaults to `sqlite://{data_dir}/mtaflow.db`.
    #[serde(default)]
    pub database_url: Option<String>,
}

fn default_step_timeout_secs() -> u64 {
    3600
}

fn default_polling_interval_secs() -> u64 {
    5
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            error_convention: ErrorConvention::default(),
            default_step_timeout_secs: default_step_timeout_secs(),
            step_timeouts: HashMap::new(),
            polling_interval_secs: default_polling_interval_secs(),
            database_url: None,
        }
    }
}

impl OrchestratorConfig {
    /// Reject values that would make polling or timeouts meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_step_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "default_step_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.polling_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "polling_interval_secs must be greater than zero".to_string(),
            ));
        }
        if let Some((step, _)) = self.step_timeouts.iter().find(|(_, secs)| **secs == 0) {
            return Err(ConfigError::Invalid(format!(
                "timeout for step '{step}' must be greater than zero"
            )));
        }
        Ok(())
    }

    /// Configured timeout override for a step, if any.
    pub fn step_timeout(&self, step_name: &str) -> Option<Duration> {
        self.step_timeouts
            .get(step_name)
            .map(|secs| Duration::from_secs(*secs))
    }

    pub fn default_step_timeout(&self) -> Duration {
        Duration::from_secs(self.default_step_timeout_secs)
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval_secs)
    }
}
