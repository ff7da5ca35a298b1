//! HTTP delegate against a loopback server speaking the service's wire format.

use roboto::actions::InvocationStatus::*;
use roboto::actions::{
    ActionReference, CreateInvocationRequest, HttpInvocationDelegate, Invocation,
    InvocationDataSource, InvocationDelegate, LogsLocation,
};
use roboto::config::RobotoConfig;
use roboto::error::ApiError;
use roboto::query::{Comparator, Condition, QuerySpecification};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};

use super::test_utils::{log_line, record_with};

#[derive(Debug, Clone)]
struct CapturedRequest {
    method: String,
    target: String,
    headers: HashMap<String, String>,
    body: String,
}

impl CapturedRequest {
    fn body_json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

type Handler = Box<dyn Fn(&CapturedRequest) -> (u16, String) + Send>;

/// One-connection-per-request HTTP/1.1 server on an ephemeral port.
struct LoopbackServer {
    endpoint: String,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl LoopbackServer {
    fn start(handler: Handler) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&requests);
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                let Some(request) = read_request(&mut stream) else {
                    continue;
                };
                let (status, body) = handler(&request);
                captured.lock().unwrap().push(request);
                let response = format!(
                    "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes());
                let _ = stream.flush();
            }
        });
        Self { endpoint, requests }
    }

    fn delegate(&self) -> HttpInvocationDelegate {
        let config = RobotoConfig {
            endpoint: self.endpoint.clone(),
            api_key: Some("test-key".to_string()),
            org_id: Some("og_test".to_string()),
            ..RobotoConfig::default()
        };
        HttpInvocationDelegate::new(&config).unwrap()
    }

    fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

fn read_request(stream: &mut std::net::TcpStream) -> Option<CapturedRequest> {
    let mut reader = BufReader::new(stream.try_clone().ok()?);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).ok()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_string();
    let target = parts.next()?.to_string();

    let mut headers = HashMap::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).ok()?;
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    let length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).ok()?;
    Some(CapturedRequest {
        method,
        target,
        headers,
        body: String::from_utf8_lossy(&body).to_string(),
    })
}

fn envelope(data: Value) -> String {
    json!({ "data": data }).to_string()
}

fn record_json(invocation_id: &str) -> Value {
    serde_json::to_value(record_with(invocation_id, &[Queued, Processing])).unwrap()
}

#[test]
fn get_sends_credentials_and_unwraps_envelope() {
    let server = LoopbackServer::start(Box::new(|_| (200, envelope(record_json("inv_1")))));
    let delegate = server.delegate();

    let record = delegate.get_by_id("inv_1").unwrap();

    assert_eq!(record.invocation_id, "inv_1");
    assert_eq!(record.status.len(), 2);
    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].target, "/v1/actions/invocations/inv_1");
    assert_eq!(
        requests[0].headers.get("authorization").map(String::as_str),
        Some("Bearer test-key")
    );
    assert_eq!(
        requests[0].headers.get("x-roboto-org-id").map(String::as_str),
        Some("og_test")
    );
}

#[test]
fn error_statuses_map_to_api_errors() {
    let server = LoopbackServer::start(Box::new(|request| {
        if request.target.ends_with("/missing") {
            (404, json!({"error": {"message": "Invocation missing not found"}}).to_string())
        } else if request.target.ends_with("/denied") {
            (403, "{}".to_string())
        } else {
            (500, "internal".to_string())
        }
    }));
    let delegate = server.delegate();

    match delegate.get_by_id("missing") {
        Err(ApiError::NotFound(message)) => assert_eq!(message, "Invocation missing not found"),
        other => panic!("expected NotFound, got {:?}", other),
    }
    assert!(matches!(delegate.get_by_id("denied"), Err(ApiError::Unauthorized(_))));
    assert!(matches!(
        delegate.get_by_id("other"),
        Err(ApiError::RequestFailed { status: 500, .. })
    ));
}

#[test]
fn create_posts_to_action_with_digest_and_owner() {
    let server = LoopbackServer::start(Box::new(|_| (200, envelope(record_json("inv_new")))));
    let delegate = server.delegate();
    let mut action = ActionReference::named("ingest");
    action.digest = Some("sha256:abc".to_string());
    action.owner_org_id = Some("og_owner".to_string());
    let request = CreateInvocationRequest::new(action, InvocationDataSource::dataset("ds_1"))
        .with_parameter("threshold", 0.5)
        .with_idempotency_id("run-1");

    let invocation = Invocation::create(&request, Arc::new(delegate)).unwrap();

    assert_eq!(invocation.id(), "inv_new");
    let sent = &server.requests()[0];
    assert_eq!(sent.method, "POST");
    assert_eq!(sent.target, "/v1/actions/ingest/invoke?digest=sha256%3Aabc");
    assert_eq!(
        sent.headers.get("x-roboto-resource-owner-id").map(String::as_str),
        Some("og_owner")
    );
    let body = sent.body_json();
    assert_eq!(body["data_source_id"], "ds_1");
    assert_eq!(body["data_source_type"], "Dataset");
    assert_eq!(body["idempotency_id"], "run-1");
    assert_eq!(body["parameter_values"]["threshold"], 0.5);
}

#[test]
fn query_pages_follow_next_token() {
    let server = LoopbackServer::start(Box::new(|request| {
        let body = request.body_json();
        let page = if body.get("after").is_none() {
            json!({"items": [record_json("inv_a")], "next_token": "page-2"})
        } else {
            json!({"items": [record_json("inv_b")]})
        };
        (200, envelope(page))
    }));
    let delegate = Arc::new(server.delegate());
    let query = QuerySpecification::new().with_condition(Condition::new(
        "provenance.action.name",
        Comparator::Equals,
        "ingest",
    ));

    let ids: Vec<String> = Invocation::query(query, delegate, Some("og_query".to_string()))
        .unwrap()
        .map(|r| r.unwrap().id().to_string())
        .collect();

    assert_eq!(ids, vec!["inv_a", "inv_b"]);
    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].target, "/v1/actions/invocations/query");
    assert_eq!(requests[1].body_json()["after"], "page-2");
    assert_eq!(requests[1].body_json()["condition"]["field"], "provenance.action.name");
    assert_eq!(
        requests[0].headers.get("x-roboto-org-id").map(String::as_str),
        Some("og_query")
    );
}

#[test]
fn status_update_and_logs_location_round_trip() {
    let server = LoopbackServer::start(Box::new(|request| {
        let mut record = record_json("inv_1");
        if request.target.ends_with("/status") {
            let body = request.body_json();
            record["status"]
                .as_array_mut()
                .unwrap()
                .push(json!({"status": body["status"], "detail": body["detail"], "timestamp": "2024-01-01T00:01:00Z"}));
        }
        if request.method == "PUT" {
            record["logs_location"] = request.body_json();
        }
        (200, envelope(record))
    }));
    let delegate = Arc::new(server.delegate());
    let mut invocation = Invocation::new(record_with("inv_1", &[Queued, Processing]), delegate).unwrap();

    invocation.update_status(Completed, Some("done")).unwrap();
    assert_eq!(invocation.current_status(), Completed);

    let location = LogsLocation {
        bucket: "roboto-logs".to_string(),
        prefix: "og_test/inv_1".to_string(),
    };
    invocation.set_logs_location(&location).unwrap();
    assert_eq!(invocation.logs_location(), Some(&location));

    let requests = server.requests();
    assert_eq!(requests[0].target, "/v1/actions/invocations/inv_1/status");
    assert_eq!(requests[0].body_json(), json!({"status": "Completed", "detail": "done"}));
    assert_eq!(requests[1].method, "PUT");
    assert_eq!(requests[1].target, "/v1/actions/invocations/inv_1/logs");
}

#[test]
fn stream_logs_passes_cursor() {
    let server = LoopbackServer::start(Box::new(|request| {
        let batch = if request.target.contains("last_read=") {
            json!({"items": [log_line("second")], "has_next": false, "last_read": "c2"})
        } else {
            json!({"items": [log_line("first")], "has_next": true, "last_read": "c1"})
        };
        (200, envelope(batch))
    }));
    let delegate = Arc::new(server.delegate());
    let invocation = Invocation::new(record_with("inv_1", &[Queued]), delegate).unwrap();

    let mut stream = invocation.stream_logs(None);
    let lines: Vec<String> = stream.by_ref().map(|r| r.unwrap().log).collect();

    assert_eq!(lines, vec!["first", "second"]);
    assert_eq!(stream.last_read(), Some("c2"));
    let requests = server.requests();
    assert_eq!(requests[0].target, "/v1/actions/invocations/inv_1/logs/stream");
    assert_eq!(
        requests[1].target,
        "/v1/actions/invocations/inv_1/logs/stream?last_read=c1"
    );
}

#[test]
fn cancel_ignores_response_body() {
    let server = LoopbackServer::start(Box::new(|_| (200, String::new())));
    let delegate = server.delegate();
    delegate.cancel_invocation("inv_1").unwrap();
    let requests = server.requests();
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].target, "/v1/actions/invocations/inv_1/cancel");
}

#[test]
fn connection_refused_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    let config = RobotoConfig {
        endpoint,
        ..RobotoConfig::default()
    };
    let delegate = HttpInvocationDelegate::new(&config).unwrap();
    assert!(matches!(delegate.get_by_id("inv_1"), Err(ApiError::Transport(_))));
}
