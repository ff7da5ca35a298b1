//! CLI parse: clap types for Roboto. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Roboto CLI - inspect and manage action invocations
#[derive(Parser, Debug)]
#[command(name = "roboto")]
#[command(about = "Inspect and manage Roboto action invocations")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (layered over the global config file)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Service endpoint (overrides configuration)
    #[arg(long, global = true)]
    pub endpoint: Option<String>,

    /// Org to act in (overrides configuration)
    #[arg(long, global = true)]
    pub org: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Disable logging entirely
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long, global = true)]
    pub log_output: Option<String>,

    /// Log file path (when output is "file")
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Action invocations
    Invocations {
        #[command(subcommand)]
        command: InvocationCommands,
    },
    /// Client configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

impl Commands {
    /// True for long-running commands that stop cleanly on Ctrl-C.
    pub fn is_tail(&self) -> bool {
        matches!(
            self,
            Commands::Invocations {
                command: InvocationCommands::Status { tail: true, .. }
                    | InvocationCommands::Logs { tail: true, .. }
            }
        )
    }
}

#[derive(Subcommand, Debug)]
pub enum InvocationCommands {
    /// Print an invocation record as JSON
    Get {
        invocation_id: String,
    },
    /// Show the status history of an invocation
    Status {
        invocation_id: String,

        /// Poll until the invocation reaches a terminal status
        #[arg(long)]
        tail: bool,

        /// Output format (json or text)
        #[arg(long, default_value = "json")]
        format: String,
    },
    /// Request cancellation of an invocation
    Cancel {
        invocation_id: String,
    },
    /// Print the logs of an invocation
    Logs {
        invocation_id: String,

        /// Follow new output until the invocation reaches a terminal status
        #[arg(long)]
        tail: bool,
    },
    /// List invocations matching a set of conditions (joined with AND)
    Query {
        /// Attribute to filter on; repeat together with --comparator and --value
        #[arg(long = "field")]
        fields: Vec<String>,

        /// Comparator for the matching --field (e.g. Equals, GreaterThan, =, >=)
        #[arg(long = "comparator")]
        comparators: Vec<String>,

        /// Value for the matching --field, parsed as JSON when possible
        #[arg(long = "value")]
        values: Vec<String>,

        /// Attribute to sort by
        #[arg(long)]
        sort_by: Option<String>,

        /// ascending or descending
        #[arg(long, requires = "sort_by")]
        sort_direction: Option<String>,

        /// Page size requested from the service
        #[arg(long)]
        limit: Option<u32>,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Invoke an action on a dataset
    Create {
        /// Action name
        action: String,

        /// Dataset to process
        #[arg(long)]
        dataset: String,

        /// Pin the action to a specific digest
        #[arg(long)]
        digest: Option<String>,

        /// Parameter as name=value; value parsed as JSON when possible
        #[arg(long = "param")]
        params: Vec<String>,

        /// Input file path or glob within the dataset
        #[arg(long = "input")]
        inputs: Vec<String>,

        /// Key that collapses retried creations into one invocation
        #[arg(long)]
        idempotency_id: Option<String>,

        /// Remote execution timeout in seconds
        #[arg(long)]
        timeout: Option<u32>,

        /// vCPU units (1024 = 1 vCPU)
        #[arg(long)]
        vcpu: Option<u32>,

        /// Memory in MiB
        #[arg(long)]
        memory: Option<u32>,

        /// Ephemeral storage in GiB
        #[arg(long)]
        storage: Option<u32>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration (API key masked)
    Show {
        /// Output format (toml or json)
        #[arg(long, default_value = "toml")]
        format: String,
    },
    /// Print the global configuration file path
    Path,
}
