//! CLI domain: parse, route, help, output, and presentation only.
//! No domain orchestration; single route table dispatches to invocation handles.

mod help;
mod output;
mod parse;
mod presentation;
mod route;

pub use help::command_name;
pub use output::map_error;
pub use parse::{Cli, Commands, ConfigCommands, InvocationCommands};
pub use presentation::{
    format_config_json, format_config_toml, format_invocation_json, format_invocation_table,
    format_log_line, format_status_history_json, format_status_history_text, format_status_line,
    styled_status,
};
pub use route::RunContext;
