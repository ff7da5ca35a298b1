//! CLI command-name contract used in log events.

use crate::cli::parse::{Commands, ConfigCommands, InvocationCommands};

/// Dotted command name (e.g. "invocations.status", "config.show").
pub fn command_name(command: &Commands) -> String {
    match command {
        Commands::Invocations { command } => {
            format!("invocations.{}", invocation_command_name(command))
        }
        Commands::Config { command } => format!("config.{}", config_command_name(command)),
    }
}

pub fn invocation_command_name(command: &InvocationCommands) -> &'static str {
    match command {
        InvocationCommands::Get { .. } => "get",
        InvocationCommands::Status { .. } => "status",
        InvocationCommands::Cancel { .. } => "cancel",
        InvocationCommands::Logs { .. } => "logs",
        InvocationCommands::Query { .. } => "query",
        InvocationCommands::Create { .. } => "create",
    }
}

pub fn config_command_name(command: &ConfigCommands) -> &'static str {
    match command {
        ConfigCommands::Show { .. } => "show",
        ConfigCommands::Path => "path",
    }
}
