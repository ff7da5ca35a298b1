//! Invocation command presentation: records, status history, logs, query tables.

use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;

use crate::actions::{Invocation, InvocationRecord, InvocationStatus, InvocationStatusRecord, LogRecord};
use crate::error::ApiError;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

pub fn format_invocation_json(record: &InvocationRecord) -> Result<String, ApiError> {
    Ok(serde_json::to_string_pretty(record)?)
}

/// Status history as a JSON array, in ledger order.
pub fn format_status_history_json(history: &[InvocationStatusRecord]) -> Result<String, ApiError> {
    Ok(serde_json::to_string_pretty(history)?)
}

pub fn format_status_history_text(history: &[InvocationStatusRecord]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Status", "Timestamp", "Detail"]);
    for entry in history {
        table.add_row(vec![
            entry.status.to_string(),
            entry.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            entry.detail.clone(),
        ]);
    }
    table.to_string()
}

/// One status entry for tail output. `json` emits a single-line object.
pub fn format_status_line(entry: &InvocationStatusRecord, json: bool) -> Result<String, ApiError> {
    if json {
        return Ok(serde_json::to_string(entry)?);
    }
    let mut line = format!(
        "{} {}",
        entry.timestamp.format(TIMESTAMP_FORMAT).dimmed(),
        styled_status(entry.status)
    );
    if entry.detail != crate::actions::status::DEFAULT_STATUS_DETAIL {
        line.push_str(&format!(": {}", entry.detail));
    }
    Ok(line)
}

pub fn format_log_line(record: &LogRecord) -> String {
    record.log.trim_end_matches('\n').to_string()
}

/// Status name colored by outcome.
pub fn styled_status(status: InvocationStatus) -> String {
    let name = status.as_str();
    match status {
        InvocationStatus::Completed => name.green().to_string(),
        InvocationStatus::Failed | InvocationStatus::Deadly => name.red().to_string(),
        InvocationStatus::Cancelled => name.yellow().to_string(),
        s if s.is_running() => name.cyan().to_string(),
        _ => name.to_string(),
    }
}

pub fn format_invocation_table(invocations: &[Invocation]) -> String {
    if invocations.is_empty() {
        return "No invocations found.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Invocation", "Action", "Status", "Created", "Data source"]);
    for invocation in invocations {
        table.add_row(vec![
            invocation.id().to_string(),
            invocation.action().name.clone(),
            invocation.current_status().to_string(),
            invocation.created().format(TIMESTAMP_FORMAT).to_string(),
            invocation.data_source().data_source_id.clone(),
        ]);
    }
    format!("{}\n\nTotal: {} invocation(s)", table, invocations.len())
}
