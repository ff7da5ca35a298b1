//! Config command presentation.

use crate::config::RobotoConfig;
use crate::error::ApiError;

pub fn format_config_toml(config: &RobotoConfig) -> Result<String, ApiError> {
    toml::to_string_pretty(&config.redacted())
        .map_err(|e| ApiError::ConfigError(format!("Failed to render configuration: {}", e)))
}

pub fn format_config_json(config: &RobotoConfig) -> Result<String, ApiError> {
    Ok(serde_json::to_string_pretty(&config.redacted())?)
}
