//! CLI route: single route table and run context. Dispatches to invocation handles and presentation.

use serde_json::Value;
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::actions::{
    ActionReference, ComputeRequirementOverrides, CreateInvocationRequest, HttpInvocationDelegate,
    Invocation, InvocationDataSource, InvocationDelegate,
};
use crate::cli::parse::{Commands, ConfigCommands, InvocationCommands};
use crate::cli::presentation::{
    format_config_json, format_config_toml, format_invocation_json, format_invocation_table,
    format_log_line, format_status_history_json, format_status_history_text, format_status_line,
};
use crate::config::{ConfigLoader, RobotoConfig};
use crate::error::ApiError;
use crate::query::{
    Comparator, Condition, ConditionGroup, ConditionOperator, ConditionType, QuerySpecification,
    SortDirection,
};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Runtime context for CLI execution: effective config, delegate, and interrupt flag.
pub struct RunContext {
    config: RobotoConfig,
    delegate: Arc<dyn InvocationDelegate>,
    interrupt: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl RunContext {
    /// Load config (layered, then `--endpoint`/`--org` on top) and build the HTTP delegate.
    pub fn new(
        config_path: Option<&Path>,
        endpoint: Option<&str>,
        org: Option<&str>,
    ) -> Result<Self, ApiError> {
        let mut config = ConfigLoader::load(config_path)?;
        if let Some(endpoint) = endpoint {
            config.endpoint = endpoint.to_string();
        }
        if let Some(org) = org {
            config.org_id = Some(org.to_string());
        }
        config.ensure_valid()?;

        let delegate = Arc::new(HttpInvocationDelegate::new(&config)?);
        Ok(Self::with_delegate(config, delegate))
    }

    pub fn with_delegate(config: RobotoConfig, delegate: Arc<dyn InvocationDelegate>) -> Self {
        Self {
            config,
            delegate,
            interrupt: Arc::new(AtomicBool::new(false)),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Flag checked between polls by `--tail` commands; set it to stop them.
    pub fn with_interrupt(mut self, interrupt: Arc<AtomicBool>) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn config(&self) -> &RobotoConfig {
        &self.config
    }

    /// Execute a CLI command via the single route table, writing results to `out`.
    pub fn execute(&self, command: &Commands, out: &mut dyn Write) -> Result<(), ApiError> {
        match command {
            Commands::Invocations { command } => self.handle_invocation_command(command, out),
            Commands::Config { command } => self.handle_config_command(command, out),
        }
    }

    fn handle_invocation_command(
        &self,
        command: &InvocationCommands,
        out: &mut dyn Write,
    ) -> Result<(), ApiError> {
        match command {
            InvocationCommands::Get { invocation_id } => {
                let invocation = self.fetch(invocation_id)?;
                writeln!(out, "{}", format_invocation_json(invocation.record())?)?;
            }
            InvocationCommands::Status {
                invocation_id,
                tail,
                format,
            } => {
                let json = parse_output_format(format, &["json", "text"])? == "json";
                if *tail {
                    self.tail_status(invocation_id, json, out)?;
                } else {
                    let invocation = self.fetch(invocation_id)?;
                    let rendered = if json {
                        format_status_history_json(invocation.status_log())?
                    } else {
                        format_status_history_text(invocation.status_log())
                    };
                    writeln!(out, "{}", rendered)?;
                }
            }
            InvocationCommands::Cancel { invocation_id } => {
                let invocation = self.fetch(invocation_id)?;
                let current = invocation.current_status();
                if current.is_terminal() {
                    writeln!(out, "Invocation {} is already {}", invocation_id, current)?;
                } else {
                    invocation.cancel()?;
                    writeln!(out, "Cancellation requested for {}", invocation_id)?;
                }
            }
            InvocationCommands::Logs {
                invocation_id,
                tail,
            } => {
                if *tail {
                    self.tail_logs(invocation_id, out)?;
                } else {
                    let invocation = self.fetch(invocation_id)?;
                    for record in invocation.get_logs(None) {
                        writeln!(out, "{}", format_log_line(&record?))?;
                    }
                }
            }
            InvocationCommands::Query {
                fields,
                comparators,
                values,
                sort_by,
                sort_direction,
                limit,
                format,
            } => {
                let json = parse_output_format(format, &["text", "json"])? == "json";
                let query = build_query(
                    fields,
                    comparators,
                    values,
                    sort_by.as_deref(),
                    sort_direction.as_deref(),
                    *limit,
                )?;
                let results = Invocation::query(
                    query,
                    Arc::clone(&self.delegate),
                    self.config.org_id.clone(),
                )?;
                if json {
                    for invocation in results {
                        let invocation = invocation?;
                        writeln!(out, "{}", serde_json::to_string(invocation.record())?)?;
                    }
                } else {
                    let invocations = results.collect::<Result<Vec<_>, _>>()?;
                    writeln!(out, "{}", format_invocation_table(&invocations))?;
                }
            }
            InvocationCommands::Create {
                action,
                dataset,
                digest,
                params,
                inputs,
                idempotency_id,
                timeout,
                vcpu,
                memory,
                storage,
            } => {
                let mut reference = ActionReference::named(action.as_str());
                reference.digest = digest.clone();
                let data_source = InvocationDataSource::dataset(dataset.as_str());
                let mut request = CreateInvocationRequest::new(reference, data_source)
                    .with_input_data(inputs.iter().cloned());
                for param in params {
                    let (name, value) = parse_param(param)?;
                    request = request.with_parameter(name, value);
                }
                if let Some(key) = idempotency_id {
                    request = request.with_idempotency_id(key.as_str());
                }
                if let Some(org) = &self.config.org_id {
                    request = request.with_org_id(org.as_str());
                }
                if let Some(timeout) = timeout {
                    request = request.with_timeout(*timeout);
                }
                let overrides = ComputeRequirementOverrides {
                    vcpu: *vcpu,
                    memory: *memory,
                    gpu: None,
                    storage: *storage,
                };
                if !overrides.is_empty() {
                    request = request.with_compute_overrides(overrides);
                }

                let invocation = Invocation::create(&request, Arc::clone(&self.delegate))?;
                writeln!(out, "{}", format_invocation_json(invocation.record())?)?;
            }
        }
        Ok(())
    }

    fn handle_config_command(
        &self,
        command: &ConfigCommands,
        out: &mut dyn Write,
    ) -> Result<(), ApiError> {
        match command {
            ConfigCommands::Show { format } => {
                let rendered = match parse_output_format(format, &["toml", "json"])? {
                    "json" => format_config_json(&self.config)?,
                    _ => format_config_toml(&self.config)?,
                };
                writeln!(out, "{}", rendered.trim_end())?;
            }
            ConfigCommands::Path => match ConfigLoader::global_config_path() {
                Some(path) => writeln!(out, "{}", path.display())?,
                None => {
                    return Err(ApiError::ConfigError(
                        "Neither XDG_CONFIG_HOME nor HOME is set".to_string(),
                    ))
                }
            },
        }
        Ok(())
    }

    fn fetch(&self, invocation_id: &str) -> Result<Invocation, ApiError> {
        Invocation::from_id(invocation_id, Arc::clone(&self.delegate))
    }

    /// Print each status the first time it appears, until the ledger holds a
    /// terminal status or the interrupt flag is set.
    fn tail_status(
        &self,
        invocation_id: &str,
        json: bool,
        out: &mut dyn Write,
    ) -> Result<(), ApiError> {
        let mut invocation = self.fetch(invocation_id)?;
        let mut seen = HashSet::new();
        loop {
            for entry in invocation.status_log() {
                if seen.insert(entry.status) {
                    writeln!(out, "{}", format_status_line(entry, json)?)?;
                }
            }
            out.flush()?;
            if invocation.reached_terminal_status() {
                info!(invocation_id, status = %invocation.current_status(), "Invocation finished");
                return Ok(());
            }
            if !self.wait_for_next_poll() {
                debug!(invocation_id, "Status tail interrupted");
                return Ok(());
            }
            invocation.refresh()?;
        }
    }

    /// Stream log lines, resuming from the last cursor on every poll, until the
    /// invocation is terminal and its buffered output is drained.
    fn tail_logs(&self, invocation_id: &str, out: &mut dyn Write) -> Result<(), ApiError> {
        let mut invocation = self.fetch(invocation_id)?;
        let mut cursor: Option<String> = None;
        loop {
            let finished = invocation.reached_terminal_status();
            let mut stream = invocation.stream_logs(cursor.clone());
            for record in stream.by_ref() {
                writeln!(out, "{}", format_log_line(&record?))?;
            }
            out.flush()?;
            if let Some(last_read) = stream.last_read() {
                cursor = Some(last_read.to_string());
            }
            if finished {
                return Ok(());
            }
            if !self.wait_for_next_poll() {
                debug!(invocation_id, "Log tail interrupted");
                return Ok(());
            }
            invocation.refresh()?;
        }
    }

    /// Sleep one poll interval in short slices. Returns false once interrupted.
    fn wait_for_next_poll(&self) -> bool {
        let deadline = Instant::now() + self.poll_interval;
        loop {
            if self.interrupt.load(Ordering::SeqCst) {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}

fn parse_output_format<'a>(format: &str, allowed: &[&'a str]) -> Result<&'a str, ApiError> {
    allowed
        .iter()
        .find(|candidate| **candidate == format)
        .copied()
        .ok_or_else(|| {
            ApiError::InvalidRequest(format!(
                "Invalid format: {} (expected one of {})",
                format,
                allowed.join(", ")
            ))
        })
}

/// JSON when it parses, otherwise the raw string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn parse_param(raw: &str) -> Result<(&str, Value), ApiError> {
    let (name, value) = raw.split_once('=').ok_or_else(|| {
        ApiError::InvalidRequest(format!("Parameter must be name=value, got: {}", raw))
    })?;
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::InvalidRequest(format!(
            "Parameter name cannot be empty: {}",
            raw
        )));
    }
    Ok((name, parse_value(value)))
}

fn build_query(
    fields: &[String],
    comparators: &[String],
    values: &[String],
    sort_by: Option<&str>,
    sort_direction: Option<&str>,
    limit: Option<u32>,
) -> Result<QuerySpecification, ApiError> {
    if fields.len() != comparators.len() || fields.len() != values.len() {
        return Err(ApiError::InvalidRequest(
            "Each --field needs a matching --comparator and --value".to_string(),
        ));
    }

    let mut conditions = fields
        .iter()
        .zip(comparators)
        .zip(values)
        .map(|((field, comparator), value)| {
            let comparator: Comparator = comparator.parse()?;
            Ok(ConditionType::from(Condition::new(
                field.as_str(),
                comparator,
                parse_value(value),
            )))
        })
        .collect::<Result<Vec<_>, ApiError>>()?;

    let mut query = QuerySpecification::new();
    query.condition = match conditions.len() {
        0 => None,
        1 => conditions.pop(),
        _ => Some(ConditionType::from(ConditionGroup {
            operator: ConditionOperator::And,
            conditions,
        })),
    };
    if let Some(field) = sort_by {
        let direction = match sort_direction {
            Some(direction) => direction.parse()?,
            None => SortDirection::Ascending,
        };
        query = query.sorted_by(field, direction);
    }
    if let Some(limit) = limit {
        query = query.with_limit(limit);
    }
    Ok(query)
}
