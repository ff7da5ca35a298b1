//! Shared test utilities for integration tests
//!
//! Record builders, a scripted delegate that records every call, and isolation of
//! the environment variables the config loader reads.

use chrono::{Duration, TimeZone, Utc};
use parking_lot::Mutex;
use roboto::actions::{
    ActionProvenance, ComputeRequirements, ContainerParameters, CreateInvocationRequest,
    ExecutableProvenance, InvocationDataSource, InvocationDelegate, InvocationProvenance,
    InvocationRecord, InvocationSource, InvocationStatus, InvocationStatusRecord, LogProcess,
    LogRecord, SourceProvenance,
};
use roboto::error::ApiError;
use roboto::pagination::{PaginatedList, StreamedList};
use roboto::query::QuerySpecification;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use tempfile::TempDir;

/// Ledger entries one second apart, in the given order.
pub fn ledger(statuses: &[InvocationStatus]) -> Vec<InvocationStatusRecord> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    statuses
        .iter()
        .enumerate()
        .map(|(i, status)| {
            InvocationStatusRecord::new(*status, format!("step {}", i), start + Duration::seconds(i as i64))
        })
        .collect()
}

pub fn record_with(invocation_id: &str, statuses: &[InvocationStatus]) -> InvocationRecord {
    InvocationRecord {
        invocation_id: invocation_id.to_string(),
        org_id: "og_test".to_string(),
        created: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        provenance: InvocationProvenance {
            action: ActionProvenance {
                name: "ingest".to_string(),
                org_id: "og_test".to_string(),
                digest: None,
            },
            executable: ExecutableProvenance::default(),
            source: SourceProvenance {
                source_type: InvocationSource::Manual,
                source_id: "tester".to_string(),
            },
        },
        compute_requirements: ComputeRequirements::default(),
        container_parameters: ContainerParameters::default(),
        data_source: InvocationDataSource::dataset("ds_test"),
        parameter_values: BTreeMap::new(),
        input_data: Vec::new(),
        timeout: 1800,
        status: ledger(statuses),
        logs_location: None,
        idempotency_id: None,
    }
}

pub fn log_line(text: &str) -> LogRecord {
    LogRecord {
        timestamp: Utc::now(),
        log: text.to_string(),
        process: LogProcess::Action,
    }
}

/// Delegate driven by canned responses. Every call is recorded by name.
#[derive(Default)]
pub struct ScriptedDelegate {
    records: Mutex<HashMap<String, InvocationRecord>>,
    query_pages: Mutex<VecDeque<PaginatedList<InvocationRecord>>>,
    stream_batches: Mutex<VecDeque<StreamedList<LogRecord>>>,
    pub calls: Mutex<Vec<String>>,
    pub query_tokens: Mutex<Vec<Option<String>>>,
    pub stream_cursors: Mutex<Vec<Option<String>>>,
    pub status_updates: Mutex<Vec<(InvocationStatus, String)>>,
    pub created: Mutex<Vec<CreateInvocationRequest>>,
}

impl ScriptedDelegate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(self, record: InvocationRecord) -> Self {
        self.records
            .lock()
            .insert(record.invocation_id.clone(), record);
        self
    }

    pub fn with_query_pages(self, pages: Vec<PaginatedList<InvocationRecord>>) -> Self {
        *self.query_pages.lock() = pages.into();
        self
    }

    pub fn with_stream_batches(self, batches: Vec<StreamedList<LogRecord>>) -> Self {
        *self.stream_batches.lock() = batches.into();
        self
    }

    pub fn calls_named(&self, name: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.as_str() == name).count()
    }

    fn record_call(&self, name: &str) {
        self.calls.lock().push(name.to_string());
    }

    fn stored(&self, invocation_id: &str) -> Result<InvocationRecord, ApiError> {
        self.records
            .lock()
            .get(invocation_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("Invocation {} not found", invocation_id)))
    }
}

impl InvocationDelegate for ScriptedDelegate {
    fn create_invocation(
        &self,
        request: &CreateInvocationRequest,
    ) -> Result<InvocationRecord, ApiError> {
        self.record_call("create_invocation");
        self.created.lock().push(request.clone());
        let mut record = record_with("inv_created", &[InvocationStatus::Queued]);
        record.provenance.action.name = request.action.name.clone();
        record.idempotency_id = request.idempotency_id.clone();
        Ok(record)
    }

    fn get_by_id(&self, invocation_id: &str) -> Result<InvocationRecord, ApiError> {
        self.record_call("get_by_id");
        self.stored(invocation_id)
    }

    fn cancel_invocation(&self, invocation_id: &str) -> Result<(), ApiError> {
        self.record_call("cancel_invocation");
        self.stored(invocation_id).map(|_| ())
    }

    fn update_invocation_status(
        &self,
        record: &InvocationRecord,
        status: InvocationStatus,
        detail: &str,
    ) -> Result<InvocationRecord, ApiError> {
        self.record_call("update_invocation_status");
        self.status_updates.lock().push((status, detail.to_string()));
        let mut updated = record.clone();
        updated
            .status
            .push(InvocationStatusRecord::new(status, detail, Utc::now()));
        self.records
            .lock()
            .insert(updated.invocation_id.clone(), updated.clone());
        Ok(updated)
    }

    fn query_invocations(
        &self,
        query: &QuerySpecification,
        _org_id: Option<&str>,
    ) -> Result<PaginatedList<InvocationRecord>, ApiError> {
        self.record_call("query_invocations");
        self.query_tokens.lock().push(query.after.clone());
        self.query_pages
            .lock()
            .pop_front()
            .ok_or_else(|| ApiError::Transport("no scripted query page left".to_string()))
    }

    fn get_logs(
        &self,
        _invocation_id: &str,
        _page_token: Option<&str>,
    ) -> Result<PaginatedList<LogRecord>, ApiError> {
        self.record_call("get_logs");
        Ok(PaginatedList::new(Vec::new(), None))
    }

    fn stream_logs(
        &self,
        _invocation_id: &str,
        last_read: Option<&str>,
    ) -> Result<StreamedList<LogRecord>, ApiError> {
        self.record_call("stream_logs");
        self.stream_cursors.lock().push(last_read.map(str::to_string));
        self.stream_batches
            .lock()
            .pop_front()
            .ok_or_else(|| ApiError::Transport("no scripted stream batch left".to_string()))
    }
}

static ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

const ISOLATED_VARS: &[&str] = &[
    "HOME",
    "XDG_CONFIG_HOME",
    "ROBOTO_ENDPOINT",
    "ROBOTO_API_KEY",
    "ROBOTO_ORG_ID",
    "ROBOTO_HTTP__CONNECT_TIMEOUT_SECS",
    "ROBOTO_HTTP__REQUEST_TIMEOUT_SECS",
];

/// Run `f` with HOME pointing at a fresh directory and every ROBOTO_* config
/// variable unset. Calls are serialized; the environment is restored afterwards.
pub fn with_isolated_env<F, R>(f: F) -> R
where
    F: FnOnce(&Path) -> R,
{
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let saved: Vec<(&str, Option<String>)> = ISOLATED_VARS
        .iter()
        .map(|key| (*key, std::env::var(key).ok()))
        .collect();
    let home = TempDir::new().unwrap();
    for key in ISOLATED_VARS {
        std::env::remove_var(key);
    }
    std::env::set_var("HOME", home.path());

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(home.path())));

    for (key, value) in saved {
        match value {
            Some(v) => std::env::set_var(key, v),
            None => std::env::remove_var(key),
        }
    }
    match result {
        Ok(r) => r,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}
