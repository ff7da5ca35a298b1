//! Invocation delegate boundary.
//!
//! Everything that persists or fetches invocation state goes through this trait.
//! Implementations hold no per-invocation state and are shared across handles
//! behind an `Arc`.

use crate::actions::record::{CreateInvocationRequest, InvocationRecord, LogRecord, LogsLocation};
use crate::actions::status::InvocationStatus;
use crate::error::ApiError;
use crate::pagination::{PaginatedList, StreamedList};
use crate::query::QuerySpecification;

/// Invocation persistence and retrieval.
///
/// Errors are returned as-is to callers of [`crate::actions::Invocation`]; nothing
/// above this trait retries them.
pub trait InvocationDelegate: Send + Sync {
    /// Create an invocation. Repeated calls carrying the same `idempotency_id` for
    /// the same action and org must return the originally created record.
    fn create_invocation(
        &self,
        request: &CreateInvocationRequest,
    ) -> Result<InvocationRecord, ApiError>;

    /// Fails with [`ApiError::NotFound`] when the id is unknown.
    fn get_by_id(&self, invocation_id: &str) -> Result<InvocationRecord, ApiError>;

    fn cancel_invocation(&self, invocation_id: &str) -> Result<(), ApiError>;

    /// Append `status` to the ledger of `record` and return the updated record.
    fn update_invocation_status(
        &self,
        record: &InvocationRecord,
        status: InvocationStatus,
        detail: &str,
    ) -> Result<InvocationRecord, ApiError>;

    fn query_invocations(
        &self,
        query: &QuerySpecification,
        org_id: Option<&str>,
    ) -> Result<PaginatedList<InvocationRecord>, ApiError>;

    fn get_logs(
        &self,
        invocation_id: &str,
        page_token: Option<&str>,
    ) -> Result<PaginatedList<LogRecord>, ApiError>;

    fn stream_logs(
        &self,
        invocation_id: &str,
        last_read: Option<&str>,
    ) -> Result<StreamedList<LogRecord>, ApiError>;

    /// Record where the executor wrote raw logs. Unsupported unless overridden.
    fn set_logs_location(
        &self,
        record: &InvocationRecord,
        _location: &LogsLocation,
    ) -> Result<InvocationRecord, ApiError> {
        Err(ApiError::NotImplemented(format!(
            "set_logs_location is not supported by this delegate (invocation {})",
            record.invocation_id
        )))
    }
}
