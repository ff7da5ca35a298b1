//! Configuration System
//!
//! Layered client configuration: built-in defaults, the global config file, an
//! optional file named on the command line, then `ROBOTO_*` environment variables.

use crate::error::ApiError;
use crate::logging::LoggingConfig;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::time::Duration;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;
pub use sources::environment::ENV_PREFIX;

pub const DEFAULT_ENDPOINT: &str = "https://api.roboto.ai";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotoConfig {
    /// Service base URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Bearer token sent with every request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Org used when a request does not name one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

impl Default for RobotoConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: None,
            org_id: None,
            http: HttpConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// HTTP client timeouts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl HttpConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Endpoint(String),
    Http(String),
    Logging(String),
    Org(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Endpoint(msg) => write!(f, "Endpoint: {}", msg),
            ValidationError::Http(msg) => write!(f, "HTTP: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
            ValidationError::Org(msg) => write!(f, "Org: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl RobotoConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        match Url::parse(&self.endpoint) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => errors.push(ValidationError::Endpoint(format!(
                "unsupported scheme '{}' in {}",
                url.scheme(),
                self.endpoint
            ))),
            Err(e) => errors.push(ValidationError::Endpoint(format!(
                "'{}' is not a valid URL: {}",
                self.endpoint, e
            ))),
        }

        if self.http.connect_timeout_secs == 0 {
            errors.push(ValidationError::Http(
                "connect_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.http.request_timeout_secs == 0 {
            errors.push(ValidationError::Http(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError::Logging(format!(
                "unknown level '{}' (expected one of {})",
                self.logging.level,
                LOG_LEVELS.join(", ")
            )));
        }

        if matches!(self.org_id.as_deref(), Some(org) if org.trim().is_empty()) {
            errors.push(ValidationError::Org("org_id cannot be empty".to_string()));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// [`RobotoConfig::validate`] folded into a single [`ApiError::ConfigError`].
    pub fn ensure_valid(&self) -> Result<(), ApiError> {
        self.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                messages.join("\n")
            ))
        })
    }

    /// Copy with the API key masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.api_key.is_some() {
            copy.api_key = Some("********".to_string());
        }
        copy
    }
}
