//! Environment source: ROBOTO_ENDPOINT, ROBOTO_API_KEY, ROBOTO_HTTP__REQUEST_TIMEOUT_SECS, ...

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::Environment;

pub const ENV_PREFIX: &str = "ROBOTO";

/// Nested keys use `__`, so `ROBOTO_HTTP__CONNECT_TIMEOUT_SECS` sets `http.connect_timeout_secs`.
pub fn add_to_builder(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    )
}
