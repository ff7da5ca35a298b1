//! In-process invocation delegate.
//!
//! Keeps invocations, idempotency keys, and logs in memory. Used as the test double
//! for the delegate boundary and for offline dry runs of invocation flows.

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

use crate::actions::compute::{ComputeRequirements, ContainerParameters};
use crate::actions::delegate::InvocationDelegate;
use crate::actions::record::{
    ActionProvenance, CreateInvocationRequest, ExecutableProvenance, InvocationProvenance,
    InvocationRecord, LogRecord, LogsLocation, SourceProvenance, DEFAULT_TIMEOUT_SECS,
};
use crate::actions::status::{InvocationStatus, InvocationStatusRecord};
use crate::error::ApiError;
use crate::pagination::{PaginatedList, StreamedList};
use crate::query::{
    Comparator, Condition, ConditionOperator, ConditionType, QuerySpecification, SortDirection,
};

const DEFAULT_PAGE_SIZE: usize = 100;
const CANCEL_DETAIL: &str = "Cancelled by request";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct IdempotencyKey {
    org_id: String,
    action: String,
    idempotency_id: String,
}

#[derive(Default)]
struct State {
    // Insertion order doubles as the default sort order.
    order: Vec<String>,
    invocations: HashMap<String, InvocationRecord>,
    idempotency: HashMap<IdempotencyKey, String>,
    logs: HashMap<String, Vec<LogRecord>>,
    next_id: u64,
}

pub struct InMemoryInvocationDelegate {
    org_id: String,
    page_size: usize,
    state: RwLock<State>,
}

impl InMemoryInvocationDelegate {
    /// `org_id` is used for requests that do not name one.
    pub fn new(org_id: impl Into<String>) -> Self {
        Self {
            org_id: org_id.into(),
            page_size: DEFAULT_PAGE_SIZE,
            state: RwLock::new(State::default()),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Store a record as-is, replacing any record with the same id.
    pub fn insert(&self, record: InvocationRecord) {
        let mut state = self.state.write();
        if !state.invocations.contains_key(&record.invocation_id) {
            state.order.push(record.invocation_id.clone());
        }
        state.invocations.insert(record.invocation_id.clone(), record);
    }

    /// Append log lines as the executor would.
    pub fn append_logs<I>(&self, invocation_id: &str, lines: I) -> Result<(), ApiError>
    where
        I: IntoIterator<Item = LogRecord>,
    {
        let mut state = self.state.write();
        if !state.invocations.contains_key(invocation_id) {
            return Err(not_found(invocation_id));
        }
        state
            .logs
            .entry(invocation_id.to_string())
            .or_default()
            .extend(lines);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.state.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn page<T: Clone>(
        &self,
        items: &[T],
        token: Option<&str>,
        limit: usize,
    ) -> Result<PaginatedList<T>, ApiError> {
        let start = parse_offset(token)?.min(items.len());
        let end = start.saturating_add(limit).min(items.len());
        let page = items.get(start..end).map(<[T]>::to_vec).unwrap_or_default();
        let next_token = (end < items.len()).then(|| end.to_string());
        Ok(PaginatedList::new(page, next_token))
    }
}

fn not_found(invocation_id: &str) -> ApiError {
    ApiError::NotFound(format!("Invocation {} not found", invocation_id))
}

fn parse_offset(token: Option<&str>) -> Result<usize, ApiError> {
    match token {
        None => Ok(0),
        Some(t) => t
            .parse()
            .map_err(|_| ApiError::InvalidRequest(format!("Malformed page token: {}", t))),
    }
}

impl InvocationDelegate for InMemoryInvocationDelegate {
    fn create_invocation(
        &self,
        request: &CreateInvocationRequest,
    ) -> Result<InvocationRecord, ApiError> {
        request.validate()?;
        let org_id = request.org_id.clone().unwrap_or_else(|| self.org_id.clone());
        let key = request.idempotency_id.as_ref().map(|idempotency_id| IdempotencyKey {
            org_id: org_id.clone(),
            action: request.action.name.clone(),
            idempotency_id: idempotency_id.clone(),
        });

        let mut state = self.state.write();
        if let Some(existing) = key
            .as_ref()
            .and_then(|k| state.idempotency.get(k))
            .and_then(|id| state.invocations.get(id))
        {
            debug!(invocation_id = %existing.invocation_id, "Idempotent create hit");
            return Ok(existing.clone());
        }

        let compute_requirements = match &request.compute_requirement_overrides {
            Some(overrides) => ComputeRequirements::default().with_overrides(overrides)?,
            None => ComputeRequirements::default(),
        };
        let container_parameters = match &request.container_parameter_overrides {
            Some(overrides) => ContainerParameters::default().with_overrides(overrides),
            None => ContainerParameters::default(),
        };

        state.next_id += 1;
        let invocation_id = format!("inv_{:08}", state.next_id);
        let now = Utc::now();
        let record = InvocationRecord {
            invocation_id: invocation_id.clone(),
            org_id: org_id.clone(),
            created: now,
            provenance: InvocationProvenance {
                action: ActionProvenance {
                    name: request.action.name.clone(),
                    org_id: request
                        .action
                        .owner_org_id
                        .clone()
                        .unwrap_or_else(|| org_id.clone()),
                    digest: request.action.digest.clone(),
                },
                executable: ExecutableProvenance::default(),
                source: SourceProvenance {
                    source_type: request.invocation_source,
                    source_id: request
                        .invocation_source_id
                        .clone()
                        .unwrap_or_else(|| "unknown".to_string()),
                },
            },
            compute_requirements,
            container_parameters,
            data_source: request.data_source.clone(),
            parameter_values: request.parameter_values.clone(),
            input_data: request.input_data.clone(),
            timeout: request.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS),
            status: vec![InvocationStatusRecord::new(
                InvocationStatus::Queued,
                "None",
                now,
            )],
            logs_location: None,
            idempotency_id: request.idempotency_id.clone(),
        };

        if let Some(k) = key {
            state.idempotency.insert(k, invocation_id.clone());
        }
        state.order.push(invocation_id.clone());
        state.invocations.insert(invocation_id, record.clone());
        Ok(record)
    }

    fn get_by_id(&self, invocation_id: &str) -> Result<InvocationRecord, ApiError> {
        self.state
            .read()
            .invocations
            .get(invocation_id)
            .cloned()
            .ok_or_else(|| not_found(invocation_id))
    }

    fn cancel_invocation(&self, invocation_id: &str) -> Result<(), ApiError> {
        let mut state = self.state.write();
        let record = state
            .invocations
            .get_mut(invocation_id)
            .ok_or_else(|| not_found(invocation_id))?;
        if !record.status.iter().any(|s| s.status.is_terminal()) {
            record.status.push(InvocationStatusRecord::new(
                InvocationStatus::Cancelled,
                CANCEL_DETAIL,
                Utc::now(),
            ));
        }
        Ok(())
    }

    fn update_invocation_status(
        &self,
        record: &InvocationRecord,
        status: InvocationStatus,
        detail: &str,
    ) -> Result<InvocationRecord, ApiError> {
        let mut state = self.state.write();
        let stored = state
            .invocations
            .get_mut(&record.invocation_id)
            .ok_or_else(|| not_found(&record.invocation_id))?;
        stored
            .status
            .push(InvocationStatusRecord::new(status, detail, Utc::now()));
        Ok(stored.clone())
    }

    fn query_invocations(
        &self,
        query: &QuerySpecification,
        org_id: Option<&str>,
    ) -> Result<PaginatedList<InvocationRecord>, ApiError> {
        let org_id = org_id.unwrap_or(&self.org_id);
        let state = self.state.read();
        let mut matched: Vec<(Value, InvocationRecord)> = Vec::new();
        for id in &state.order {
            let Some(record) = state.invocations.get(id) else {
                continue;
            };
            if record.org_id != org_id {
                continue;
            }
            let value = serde_json::to_value(record)?;
            let keep = query
                .condition
                .as_ref()
                .map(|c| evaluate(&value, c))
                .unwrap_or(true);
            if keep {
                matched.push((value, record.clone()));
            }
        }

        if let Some(sort_by) = &query.sort_by {
            matched.sort_by(|(a, _), (b, _)| {
                compare_values(lookup(a, sort_by), lookup(b, sort_by)).unwrap_or(Ordering::Equal)
            });
            if query.sort_direction == Some(SortDirection::Descending) {
                matched.reverse();
            }
        }

        let records: Vec<InvocationRecord> = matched.into_iter().map(|(_, r)| r).collect();
        let limit = query.limit.map(|l| l as usize).unwrap_or(self.page_size);
        self.page(&records, query.after.as_deref(), limit.max(1))
    }

    fn get_logs(
        &self,
        invocation_id: &str,
        page_token: Option<&str>,
    ) -> Result<PaginatedList<LogRecord>, ApiError> {
        let state = self.state.read();
        if !state.invocations.contains_key(invocation_id) {
            return Err(not_found(invocation_id));
        }
        let logs = state.logs.get(invocation_id).map(Vec::as_slice).unwrap_or(&[]);
        self.page(logs, page_token, self.page_size)
    }

    fn stream_logs(
        &self,
        invocation_id: &str,
        last_read: Option<&str>,
    ) -> Result<StreamedList<LogRecord>, ApiError> {
        let state = self.state.read();
        if !state.invocations.contains_key(invocation_id) {
            return Err(not_found(invocation_id));
        }
        let logs = state.logs.get(invocation_id).map(Vec::as_slice).unwrap_or(&[]);
        let start = parse_offset(last_read)?.min(logs.len());
        let end = (start + self.page_size).min(logs.len());
        Ok(StreamedList::new(
            logs[start..end].to_vec(),
            end < logs.len(),
            Some(end.to_string()),
        ))
    }

    fn set_logs_location(
        &self,
        record: &InvocationRecord,
        location: &LogsLocation,
    ) -> Result<InvocationRecord, ApiError> {
        let mut state = self.state.write();
        let stored = state
            .invocations
            .get_mut(&record.invocation_id)
            .ok_or_else(|| not_found(&record.invocation_id))?;
        stored.logs_location = Some(location.clone());
        Ok(stored.clone())
    }
}

/// Resolve a dotted path inside a JSON document.
fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Option<Ordering> {
    match (a?, b?) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn evaluate(document: &Value, condition: &ConditionType) -> bool {
    match condition {
        ConditionType::Condition(c) => evaluate_condition(document, c),
        ConditionType::Group(group) => match group.operator {
            ConditionOperator::And => group.conditions.iter().all(|c| evaluate(document, c)),
            ConditionOperator::Or => group.conditions.iter().any(|c| evaluate(document, c)),
        },
    }
}

fn evaluate_condition(document: &Value, condition: &Condition) -> bool {
    let actual = lookup(document, &condition.field);
    let expected = &condition.value;
    match condition.comparator {
        Comparator::Equals => actual == Some(expected),
        Comparator::NotEquals => actual != Some(expected),
        Comparator::GreaterThan => compare_values(actual, Some(expected)) == Some(Ordering::Greater),
        Comparator::GreaterThanOrEqual => matches!(
            compare_values(actual, Some(expected)),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Comparator::LessThan => compare_values(actual, Some(expected)) == Some(Ordering::Less),
        Comparator::LessThanOrEqual => matches!(
            compare_values(actual, Some(expected)),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Comparator::Contains => contains(actual, expected),
        Comparator::NotContains => !contains(actual, expected),
        Comparator::IsNull => matches!(actual, None | Some(Value::Null)),
        Comparator::IsNotNull => !matches!(actual, None | Some(Value::Null)),
        Comparator::Exists => actual.is_some(),
        Comparator::NotExists => actual.is_none(),
        Comparator::BeginsWith => match (actual, expected) {
            (Some(Value::String(s)), Value::String(prefix)) => s.starts_with(prefix.as_str()),
            _ => false,
        },
    }
}

fn contains(actual: Option<&Value>, expected: &Value) -> bool {
    match (actual, expected) {
        (Some(Value::Array(items)), _) => items.contains(expected),
        (Some(Value::String(s)), Value::String(needle)) => s.contains(needle.as_str()),
        (Some(Value::Object(map)), Value::String(key)) => map.contains_key(key),
        _ => false,
    }
}
