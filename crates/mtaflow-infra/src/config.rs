//! Orchestrator configuration loader.
//!
//! Reads `mtaflow.toml` from the data directory and deserializes it into
//! [`OrchestratorConfig`]. Falls back to defaults when the file is missing,
//! malformed, or fails validation.

use std::path::Path;

use mtaflow_types::config::OrchestratorConfig;
use mtaflow_types::error::ConfigError;

use crate::sqlite::pool::database_url_in;

pub const CONFIG_FILE_NAME: &str = "mtaflow.toml";

/// Parse and validate a configuration document.
pub fn parse_config(content: &str) -> Result<OrchestratorConfig, ConfigError> {
    let config: OrchestratorConfig = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from `{data_dir}/mtaflow.toml`.
///
/// - If the file does not exist, returns [`OrchestratorConfig::default()`].
/// - If the file cannot be read, parsed or validated, logs a warning and
///   returns the default.
pub async fn load_config(data_dir: &Path) -> OrchestratorConfig {
    let config_path = data_dir.join(CONFIG_FILE_NAME);

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No {CONFIG_FILE_NAME} found at {}, using defaults", config_path.display());
            return OrchestratorConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return OrchestratorConfig::default();
        }
    };

    match parse_config(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("{}: {err}, using defaults", config_path.display());
            OrchestratorConfig::default()
        }
    }
}

/// Database URL from the config, or the default file inside `data_dir`.
pub fn resolve_database_url(config: &OrchestratorConfig, data_dir: &Path) -> String {
    config
        .database_url
        .clone()
        .unwrap_or_else(|| database_url_in(data_dir))
}
