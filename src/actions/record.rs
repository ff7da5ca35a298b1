//! Wire representation of invocations and their logs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::actions::compute::{
    ComputeRequirementOverrides, ComputeRequirements, ContainerParameterOverrides,
    ContainerParameters,
};
use crate::actions::status::InvocationStatusRecord;
use crate::error::ApiError;

/// Default remote execution budget, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u32 = 30 * 60;

/// What caused an invocation to be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvocationSource {
    Trigger,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvocationDataSourceType {
    Dataset,
}

/// Input an invocation processes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationDataSource {
    pub data_source_type: InvocationDataSourceType,
    pub data_source_id: String,
}

impl InvocationDataSource {
    pub fn dataset(dataset_id: impl Into<String>) -> Self {
        Self {
            data_source_type: InvocationDataSourceType::Dataset,
            data_source_id: dataset_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionProvenance {
    pub name: String,
    pub org_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutableProvenance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_image_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_image_digest: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceProvenance {
    pub source_type: InvocationSource,
    pub source_id: String,
}

/// Which action, executable, and source produced an invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationProvenance {
    pub action: ActionProvenance,
    #[serde(default)]
    pub executable: ExecutableProvenance,
    pub source: SourceProvenance,
}

/// Where an invocation's raw logs were written by the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogsLocation {
    pub bucket: String,
    pub prefix: String,
}

/// One invocation as persisted by the service.
///
/// Only `status` grows over time, and only by the delegate returning a new record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRecord {
    pub invocation_id: String,
    pub org_id: String,
    pub created: DateTime<Utc>,
    pub provenance: InvocationProvenance,
    #[serde(default)]
    pub compute_requirements: ComputeRequirements,
    #[serde(default)]
    pub container_parameters: ContainerParameters,
    pub data_source: InvocationDataSource,
    #[serde(default)]
    pub parameter_values: BTreeMap<String, Value>,
    #[serde(default)]
    pub input_data: Vec<String>,
    #[serde(default = "default_timeout")]
    pub timeout: u32,
    pub status: Vec<InvocationStatusRecord>,
    #[serde(default)]
    pub logs_location: Option<LogsLocation>,
    #[serde(default)]
    pub idempotency_id: Option<String>,
}

fn default_timeout() -> u32 {
    DEFAULT_TIMEOUT_SECS
}

impl InvocationRecord {
    /// Top-level attribute names, as serialized. Query fields are checked against these.
    pub const FIELDS: &'static [&'static str] = &[
        "invocation_id",
        "org_id",
        "created",
        "provenance",
        "compute_requirements",
        "container_parameters",
        "data_source",
        "parameter_values",
        "input_data",
        "timeout",
        "status",
        "logs_location",
        "idempotency_id",
    ];

    /// Reject records that break the never-empty ledger invariant.
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.status.is_empty() {
            return Err(ApiError::InvalidRequest(format!(
                "Invocation {} has an empty status ledger",
                self.invocation_id
            )));
        }
        Ok(())
    }
}

/// Reference to the action to invoke. Lookup-only; never cascades.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionReference {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    /// Org that owns the action when invoking an action shared from another org.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_org_id: Option<String>,
}

impl ActionReference {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            digest: None,
            owner_org_id: None,
        }
    }
}

/// Everything the delegate needs to create one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateInvocationRequest {
    pub action: ActionReference,
    #[serde(default)]
    pub parameter_values: BTreeMap<String, Value>,
    #[serde(default)]
    pub input_data: Vec<String>,
    pub data_source: InvocationDataSource,
    pub invocation_source: InvocationSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invocation_source_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute_requirement_overrides: Option<ComputeRequirementOverrides>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_parameter_overrides: Option<ContainerParameterOverrides>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
}

impl CreateInvocationRequest {
    /// Manual invocation of `action` against a dataset; refine with the builder methods.
    pub fn new(action: ActionReference, data_source: InvocationDataSource) -> Self {
        Self {
            action,
            parameter_values: BTreeMap::new(),
            input_data: Vec::new(),
            data_source,
            invocation_source: InvocationSource::Manual,
            invocation_source_id: None,
            compute_requirement_overrides: None,
            container_parameter_overrides: None,
            idempotency_id: None,
            org_id: None,
            timeout: None,
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameter_values.insert(name.into(), value.into());
        self
    }

    pub fn with_input_data<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_data.extend(inputs.into_iter().map(Into::into));
        self
    }

    pub fn with_source(mut self, source: InvocationSource, source_id: impl Into<String>) -> Self {
        self.invocation_source = source;
        self.invocation_source_id = Some(source_id.into());
        self
    }

    pub fn with_compute_overrides(mut self, overrides: ComputeRequirementOverrides) -> Self {
        self.compute_requirement_overrides = Some(overrides);
        self
    }

    pub fn with_container_overrides(mut self, overrides: ContainerParameterOverrides) -> Self {
        self.container_parameter_overrides = Some(overrides);
        self
    }

    pub fn with_idempotency_id(mut self, idempotency_id: impl Into<String>) -> Self {
        self.idempotency_id = Some(idempotency_id.into());
        self
    }

    pub fn with_org_id(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u32) -> Self {
        self.timeout = Some(timeout_secs);
        self
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        if self.action.name.trim().is_empty() {
            return Err(ApiError::InvalidRequest(
                "Action name cannot be empty".to_string(),
            ));
        }
        if self.data_source.data_source_id.trim().is_empty() {
            return Err(ApiError::InvalidRequest(
                "Data source id cannot be empty".to_string(),
            ));
        }
        if self.timeout == Some(0) {
            return Err(ApiError::InvalidRequest(
                "Timeout must be greater than zero".to_string(),
            ));
        }
        if let Some(overrides) = &self.compute_requirement_overrides {
            overrides.validate()?;
        }
        Ok(())
    }
}

/// Container phase that emitted a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogProcess {
    Setup,
    Action,
    Output,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub log: String,
    pub process: LogProcess,
}
