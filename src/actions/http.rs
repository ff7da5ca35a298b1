//! HTTP invocation delegate backed by the Roboto service.
//!
//! The delegate trait is synchronous, so each call blocks on the async `reqwest`
//! client inside a private current-thread runtime. Do not call it from inside
//! another tokio runtime.

use reqwest::{Client, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::runtime::Runtime;
use tracing::debug;

use crate::actions::compute::{ComputeRequirementOverrides, ContainerParameterOverrides};
use crate::actions::delegate::InvocationDelegate;
use crate::actions::record::{
    CreateInvocationRequest, InvocationDataSourceType, InvocationRecord, InvocationSource,
    LogRecord, LogsLocation,
};
use crate::actions::status::InvocationStatus;
use crate::config::RobotoConfig;
use crate::error::ApiError;
use crate::pagination::{PaginatedList, StreamedList};
use crate::query::QuerySpecification;

const ORG_ID_HEADER: &str = "X-Roboto-Org-Id";
const RESOURCE_OWNER_HEADER: &str = "X-Roboto-Resource-Owner-Id";

#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Serialize)]
struct InvokeBody<'a> {
    input_data: &'a [String],
    parameter_values: &'a BTreeMap<String, Value>,
    data_source_id: &'a str,
    data_source_type: InvocationDataSourceType,
    invocation_source: InvocationSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    invocation_source_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    compute_requirement_overrides: Option<&'a ComputeRequirementOverrides>,
    #[serde(skip_serializing_if = "Option::is_none")]
    container_parameter_overrides: Option<&'a ContainerParameterOverrides>,
    #[serde(skip_serializing_if = "Option::is_none")]
    idempotency_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout: Option<u32>,
}

#[derive(Serialize)]
struct StatusBody<'a> {
    status: InvocationStatus,
    detail: &'a str,
}

pub struct HttpInvocationDelegate {
    client: Client,
    runtime: Runtime,
    endpoint: Url,
    api_key: Option<String>,
    org_id: Option<String>,
}

impl HttpInvocationDelegate {
    pub fn new(config: &RobotoConfig) -> Result<Self, ApiError> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            ApiError::ConfigError(format!("Invalid endpoint {}: {}", config.endpoint, e))
        })?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ApiError::ConfigError(format!("Failed to create runtime: {}", e)))?;
        let client = {
            let _guard = runtime.enter();
            Client::builder()
                .connect_timeout(config.http.connect_timeout())
                .timeout(config.http.request_timeout())
                .build()
                .map_err(|e| {
                    ApiError::ConfigError(format!("Failed to create HTTP client: {}", e))
                })?
        };

        Ok(Self {
            client,
            runtime,
            endpoint,
            api_key: config.api_key.clone(),
            org_id: config.org_id.clone(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        endpoint_url(&self.endpoint, segments)
    }

    fn request(&self, method: Method, url: Url, org_id: Option<&str>) -> RequestBuilder {
        let mut builder = self.client.request(method, url);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }
        if let Some(org_id) = org_id.or(self.org_id.as_deref()) {
            builder = builder.header(ORG_ID_HEADER, org_id);
        }
        builder
    }

    fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        self.runtime.block_on(async {
            let response = request.send().await.map_err(map_http_error)?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(map_status(status.as_u16(), &body));
            }
            let body = response.bytes().await.map_err(map_http_error)?;
            decode_envelope(&body)
        })
    }

    fn execute_unit(&self, request: RequestBuilder) -> Result<(), ApiError> {
        self.runtime.block_on(async {
            let response = request.send().await.map_err(map_http_error)?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(map_status(status.as_u16(), &body));
            }
            Ok(())
        })
    }
}

/// Append path segments to `base`, percent-encoding each one.
pub fn endpoint_url(base: &Url, segments: &[&str]) -> Result<Url, ApiError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| ApiError::ConfigError(format!("Endpoint {} cannot be a base URL", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Map a non-2xx response to an error, preferring the service's own message.
pub fn map_status(status: u16, body: &str) -> ApiError {
    let message = error_message(body).unwrap_or_else(|| format!("HTTP {}", status));
    match status {
        404 => ApiError::NotFound(message),
        400 | 422 => ApiError::InvalidRequest(message),
        401 | 403 => ApiError::Unauthorized(message),
        501 => ApiError::NotImplemented(message),
        _ => ApiError::RequestFailed { status, message },
    }
}

fn error_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    let parsed = serde_json::from_str::<Value>(body).ok();
    let from_json = parsed.as_ref().and_then(|v| {
        v.pointer("/error/message")
            .or_else(|| v.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });
    Some(from_json.unwrap_or_else(|| body.to_string()))
}

fn map_http_error(error: reqwest::Error) -> ApiError {
    if error.is_timeout() {
        ApiError::Transport(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        ApiError::Transport(format!("Connection error: {}", error))
    } else {
        ApiError::Transport(format!("HTTP error: {}", error))
    }
}

fn decode_envelope<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    let envelope: DataEnvelope<T> = serde_json::from_slice(body)?;
    Ok(envelope.data)
}

impl InvocationDelegate for HttpInvocationDelegate {
    fn create_invocation(
        &self,
        request: &CreateInvocationRequest,
    ) -> Result<InvocationRecord, ApiError> {
        let mut url = self.url(&["v1", "actions", &request.action.name, "invoke"])?;
        if let Some(digest) = &request.action.digest {
            url.query_pairs_mut().append_pair("digest", digest);
        }
        debug!(%url, action = %request.action.name, "create_invocation");

        let body = InvokeBody {
            input_data: &request.input_data,
            parameter_values: &request.parameter_values,
            data_source_id: &request.data_source.data_source_id,
            data_source_type: request.data_source.data_source_type,
            invocation_source: request.invocation_source,
            invocation_source_id: request.invocation_source_id.as_deref(),
            compute_requirement_overrides: request.compute_requirement_overrides.as_ref(),
            container_parameter_overrides: request.container_parameter_overrides.as_ref(),
            idempotency_id: request.idempotency_id.as_deref(),
            timeout: request.timeout,
        };
        let mut builder = self
            .request(Method::POST, url, request.org_id.as_deref())
            .json(&body);
        if let Some(owner) = &request.action.owner_org_id {
            builder = builder.header(RESOURCE_OWNER_HEADER, owner);
        }
        self.execute(builder)
    }

    fn get_by_id(&self, invocation_id: &str) -> Result<InvocationRecord, ApiError> {
        let url = self.url(&["v1", "actions", "invocations", invocation_id])?;
        debug!(%url, "get_by_id");
        self.execute(self.request(Method::GET, url, None))
    }

    fn cancel_invocation(&self, invocation_id: &str) -> Result<(), ApiError> {
        let url = self.url(&["v1", "actions", "invocations", invocation_id, "cancel"])?;
        debug!(%url, "cancel_invocation");
        self.execute_unit(self.request(Method::POST, url, None))
    }

    fn update_invocation_status(
        &self,
        record: &InvocationRecord,
        status: InvocationStatus,
        detail: &str,
    ) -> Result<InvocationRecord, ApiError> {
        let url = self.url(&["v1", "actions", "invocations", &record.invocation_id, "status"])?;
        debug!(%url, %status, "update_invocation_status");
        let builder = self
            .request(Method::POST, url, Some(&record.org_id))
            .json(&StatusBody { status, detail });
        self.execute(builder)
    }

    fn query_invocations(
        &self,
        query: &QuerySpecification,
        org_id: Option<&str>,
    ) -> Result<PaginatedList<InvocationRecord>, ApiError> {
        let url = self.url(&["v1", "actions", "invocations", "query"])?;
        debug!(%url, after = ?query.after, "query_invocations");
        self.execute(self.request(Method::POST, url, org_id).json(query))
    }

    fn get_logs(
        &self,
        invocation_id: &str,
        page_token: Option<&str>,
    ) -> Result<PaginatedList<LogRecord>, ApiError> {
        let mut url = self.url(&["v1", "actions", "invocations", invocation_id, "logs"])?;
        if let Some(token) = page_token {
            url.query_pairs_mut().append_pair("page_token", token);
        }
        debug!(%url, "get_logs");
        self.execute(self.request(Method::GET, url, None))
    }

    fn stream_logs(
        &self,
        invocation_id: &str,
        last_read: Option<&str>,
    ) -> Result<StreamedList<LogRecord>, ApiError> {
        let mut url = self.url(&[
            "v1",
            "actions",
            "invocations",
            invocation_id,
            "logs",
            "stream",
        ])?;
        if let Some(cursor) = last_read {
            url.query_pairs_mut().append_pair("last_read", cursor);
        }
        debug!(%url, "stream_logs");
        self.execute(self.request(Method::GET, url, None))
    }

    fn set_logs_location(
        &self,
        record: &InvocationRecord,
        location: &LogsLocation,
    ) -> Result<InvocationRecord, ApiError> {
        let url = self.url(&["v1", "actions", "invocations", &record.invocation_id, "logs"])?;
        debug!(%url, bucket = %location.bucket, "set_logs_location");
        let builder = self
            .request(Method::PUT, url, Some(&record.org_id))
            .json(location);
        self.execute(builder)
    }
}
