//! CLI presentation: text and json formatters per command family.

mod config;
mod invocation;

pub use config::{format_config_json, format_config_toml};
pub use invocation::{
    format_invocation_json, format_invocation_table, format_log_line, format_status_history_json,
    format_status_history_text, format_status_line, styled_status,
};
