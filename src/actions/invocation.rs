//! Client-side handle over one invocation.
//!
//! An [`Invocation`] owns a snapshot of its [`InvocationRecord`]. Reads are pure
//! projections of that snapshot; state-changing calls go through the delegate and
//! replace the snapshot with the record the delegate returns.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::actions::compute::{ComputeRequirements, ContainerParameters};
use crate::actions::delegate::InvocationDelegate;
use crate::actions::record::{
    ActionProvenance, CreateInvocationRequest, ExecutableProvenance, InvocationDataSource,
    InvocationRecord, LogRecord, LogsLocation, SourceProvenance,
};
use crate::actions::status::{
    self, InvocationStatus, InvocationStatusRecord, DEFAULT_STATUS_DETAIL,
};
use crate::error::ApiError;
use crate::pagination::{Pages, StreamPages};
use crate::query::QuerySpecification;

/// Paginated log lines of one invocation.
pub type LogPages = Pages<LogRecord>;

/// Tailing log stream of one invocation; see [`StreamPages::last_read`].
pub type LogStream = StreamPages<LogRecord>;

pub struct Invocation {
    record: InvocationRecord,
    delegate: Arc<dyn InvocationDelegate>,
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}

impl Invocation {
    /// Wrap a record fetched elsewhere. Rejects records with an empty ledger.
    pub fn new(
        record: InvocationRecord,
        delegate: Arc<dyn InvocationDelegate>,
    ) -> Result<Self, ApiError> {
        record.validate()?;
        Ok(Self { record, delegate })
    }

    /// Create a new invocation. `idempotency_id`, when set on the request, is passed
    /// through unchanged so retried creations collapse to one invocation.
    pub fn create(
        request: &CreateInvocationRequest,
        delegate: Arc<dyn InvocationDelegate>,
    ) -> Result<Self, ApiError> {
        request.validate()?;
        info!(
            action = %request.action.name,
            data_source = %request.data_source.data_source_id,
            idempotency_id = ?request.idempotency_id,
            "Creating invocation"
        );
        let record = delegate.create_invocation(request)?;
        Self::new(record, delegate)
    }

    /// Always a fresh fetch.
    pub fn from_id(
        invocation_id: &str,
        delegate: Arc<dyn InvocationDelegate>,
    ) -> Result<Self, ApiError> {
        debug!(invocation_id, "Fetching invocation");
        let record = delegate.get_by_id(invocation_id)?;
        Self::new(record, delegate)
    }

    /// Lazily enumerate invocations matching `query`.
    ///
    /// Field names are checked against [`InvocationRecord::FIELDS`] before anything
    /// is sent; the first page is requested on the first call to `next`.
    pub fn query(
        query: QuerySpecification,
        delegate: Arc<dyn InvocationDelegate>,
        org_id: Option<String>,
    ) -> Result<InvocationQuery, ApiError> {
        query.validate_fields(InvocationRecord::FIELDS, "Invocation")?;

        let start = query.after.clone();
        let fetch_delegate = Arc::clone(&delegate);
        let mut query = query;
        let pages = Pages::new(
            start,
            Box::new(move |after: Option<&str>| {
                query.after = after.map(str::to_string);
                fetch_delegate.query_invocations(&query, org_id.as_deref())
            }),
        );
        Ok(InvocationQuery { pages, delegate })
    }

    pub fn record(&self) -> &InvocationRecord {
        &self.record
    }

    pub fn id(&self) -> &str {
        &self.record.invocation_id
    }

    pub fn org_id(&self) -> &str {
        &self.record.org_id
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.record.created
    }

    pub fn action(&self) -> &ActionProvenance {
        &self.record.provenance.action
    }

    pub fn executable(&self) -> &ExecutableProvenance {
        &self.record.provenance.executable
    }

    pub fn source(&self) -> &SourceProvenance {
        &self.record.provenance.source
    }

    pub fn compute_requirements(&self) -> &ComputeRequirements {
        &self.record.compute_requirements
    }

    pub fn container_parameters(&self) -> &ContainerParameters {
        &self.record.container_parameters
    }

    pub fn data_source(&self) -> &InvocationDataSource {
        &self.record.data_source
    }

    pub fn input_data(&self) -> &[String] {
        &self.record.input_data
    }

    pub fn parameter_values(&self) -> &BTreeMap<String, Value> {
        &self.record.parameter_values
    }

    /// Seconds the remote execution may run. Enforced by the executor, not here.
    pub fn timeout(&self) -> u32 {
        self.record.timeout
    }

    pub fn logs_location(&self) -> Option<&LogsLocation> {
        self.record.logs_location.as_ref()
    }

    /// Ledger entries in append order.
    pub fn status_log(&self) -> &[InvocationStatusRecord] {
        &self.record.status
    }

    /// Highest-ranked ledger entry (see [`status::current_status`]).
    pub fn current_status_record(&self) -> Option<&InvocationStatusRecord> {
        status::current_status(&self.record.status)
    }

    pub fn current_status(&self) -> InvocationStatus {
        // Ledger is never empty for a constructed handle.
        self.current_status_record()
            .map(|entry| entry.status)
            .unwrap_or(InvocationStatus::Queued)
    }

    pub fn reached_terminal_status(&self) -> bool {
        status::reached_terminal_status(&self.record.status)
    }

    pub fn is_queued_for_scheduling(&self) -> bool {
        status::is_queued_for_scheduling(&self.record.status)
    }

    /// Ask the service to cancel. Returns without waiting; call [`Invocation::refresh`]
    /// to observe the outcome. Already-terminal invocations are left alone.
    pub fn cancel(&self) -> Result<(), ApiError> {
        if self.current_status().is_terminal() {
            debug!(
                invocation_id = %self.record.invocation_id,
                status = %self.current_status(),
                "Invocation already terminal, skipping cancel"
            );
            return Ok(());
        }
        info!(invocation_id = %self.record.invocation_id, "Requesting cancellation");
        self.delegate.cancel_invocation(&self.record.invocation_id)
    }

    /// Replace the snapshot with the latest server state.
    pub fn refresh(&mut self) -> Result<(), ApiError> {
        let record = self.delegate.get_by_id(&self.record.invocation_id)?;
        record.validate()?;
        self.record = record;
        Ok(())
    }

    /// Request a status transition. `detail` defaults to `"None"`.
    ///
    /// A third `Failed` is sent as `Deadly` instead.
    pub fn update_status(
        &mut self,
        next_status: InvocationStatus,
        detail: Option<&str>,
    ) -> Result<(), ApiError> {
        let resolved = status::resolve_next_status(&self.record.status, next_status);
        if resolved != next_status {
            warn!(
                invocation_id = %self.record.invocation_id,
                failures = status::failure_count(&self.record.status),
                "Invocation failed too many times, marking as {}",
                resolved
            );
        }
        if let Some(last) = self.record.status.last() {
            if !last.status.can_transition_to(resolved) {
                warn!(
                    invocation_id = %self.record.invocation_id,
                    from = %last.status,
                    to = %resolved,
                    "Unexpected status transition, forwarding anyway"
                );
            }
        }
        let detail = detail.unwrap_or(DEFAULT_STATUS_DETAIL);
        info!(
            invocation_id = %self.record.invocation_id,
            status = %resolved,
            "Updating invocation status"
        );
        let record = self
            .delegate
            .update_invocation_status(&self.record, resolved, detail)?;
        record.validate()?;
        self.record = record;
        Ok(())
    }

    pub fn set_logs_location(&mut self, location: &LogsLocation) -> Result<(), ApiError> {
        let record = self.delegate.set_logs_location(&self.record, location)?;
        record.validate()?;
        self.record = record;
        Ok(())
    }

    /// Every log line written so far, one page at a time.
    pub fn get_logs(&self, page_token: Option<String>) -> LogPages {
        let delegate = Arc::clone(&self.delegate);
        let invocation_id = self.record.invocation_id.clone();
        Pages::new(
            page_token,
            Box::new(move |token: Option<&str>| delegate.get_logs(&invocation_id, token)),
        )
    }

    /// Tail logs from `last_read`. Exhaustion means no more buffered output right
    /// now, not that the invocation finished.
    pub fn stream_logs(&self, last_read: Option<String>) -> LogStream {
        let delegate = Arc::clone(&self.delegate);
        let invocation_id = self.record.invocation_id.clone();
        StreamPages::new(
            last_read,
            Box::new(move |cursor: Option<&str>| delegate.stream_logs(&invocation_id, cursor)),
        )
    }

    pub fn to_json(&self) -> Result<Value, ApiError> {
        Ok(serde_json::to_value(&self.record)?)
    }
}

/// Lazy, single-pass sequence of query results wrapped as handles.
pub struct InvocationQuery {
    pages: Pages<InvocationRecord>,
    delegate: Arc<dyn InvocationDelegate>,
}

impl Iterator for InvocationQuery {
    type Item = Result<Invocation, ApiError>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.pages.next()?;
        Some(record.and_then(|r| Invocation::new(r, Arc::clone(&self.delegate))))
    }
}
