//! Roboto CLI Binary
//!
//! Command-line interface for inspecting and managing action invocations.

use anyhow::Context;
use clap::Parser;
use roboto::cli::{command_name, Cli, RunContext};
use roboto::config::ConfigLoader;
use roboto::logging::{init_logging, LoggingConfig};
use std::io::Write;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

fn main() {
    let cli = Cli::parse();

    // Build logging config from CLI args, env vars, and config file
    let logging_config = build_logging_config(&cli);

    // Initialize logging early
    if let Err(e) = init_logging(Some(&logging_config)) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    let command = command_name(&cli.command);
    info!(command = %command, "Roboto CLI starting");

    let context = match RunContext::new(
        cli.config.as_deref(),
        cli.endpoint.as_deref(),
        cli.org.as_deref(),
    ) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("Error loading configuration: {}", e);
            eprintln!("{}", roboto::cli::map_error(&e));
            process::exit(1);
        }
    };

    // Only tail commands trade the default Ctrl-C behavior for a clean stop.
    let interrupted = Arc::new(AtomicBool::new(false));
    if cli.command.is_tail() {
        if let Err(e) = watch_for_interrupt(Arc::clone(&interrupted)) {
            warn!("Ctrl-C handling unavailable: {:#}", e);
        }
    }
    let context = context.with_interrupt(interrupted);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match context.execute(&cli.command, &mut out) {
        Ok(()) => {
            let _ = out.flush();
            info!(command = %command, "Command completed successfully");
        }
        Err(e) => {
            let _ = out.flush();
            error!(command = %command, "Command failed: {}", e);
            eprintln!("{}", roboto::cli::map_error(&e));
            process::exit(1);
        }
    }
}

/// Set `flag` on the first Ctrl-C; exit immediately on the second.
fn watch_for_interrupt(flag: Arc<AtomicBool>) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build signal runtime")?;
    std::thread::Builder::new()
        .name("roboto-signal".to_string())
        .spawn(move || {
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    flag.store(true, Ordering::SeqCst);
                }
                if tokio::signal::ctrl_c().await.is_ok() {
                    process::exit(0);
                }
            })
        })
        .context("failed to spawn signal watcher")?;
    Ok(())
}

/// Build logging configuration from CLI args, environment, and config file.
/// Precedence: CLI flags override config file override defaults.
fn build_logging_config(cli: &Cli) -> LoggingConfig {
    let mut config = ConfigLoader::load(cli.config.as_deref())
        .ok()
        .map(|c| c.logging)
        .unwrap_or_default();

    if cli.quiet {
        config.enabled = false;
    }
    if cli.verbose {
        config.level = "debug".to_string();
    }
    if let Some(ref level) = cli.log_level {
        config.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.format = format.clone();
    }
    if let Some(ref output) = cli.log_output {
        config.output = output.clone();
    }
    if let Some(ref file) = cli.log_file {
        config.file = Some(file.clone());
        // A log file without an explicit output implies file output.
        if cli.log_output.is_none() {
            config.output = "file".to_string();
        }
    }

    config
}
