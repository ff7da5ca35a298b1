//! Merge rules: defaults, override order, conflict handling.

use config::builder::DefaultState;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

use crate::config::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_ENDPOINT, DEFAULT_REQUEST_TIMEOUT_SECS};

/// Create a Config builder with merge policy defaults applied.
///
/// Later sources override earlier ones key by key: defaults, global file,
/// explicit file, environment.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("endpoint", DEFAULT_ENDPOINT)?
        .set_default(
            "http.connect_timeout_secs",
            DEFAULT_CONNECT_TIMEOUT_SECS as i64,
        )?
        .set_default(
            "http.request_timeout_secs",
            DEFAULT_REQUEST_TIMEOUT_SECS as i64,
        )
}
