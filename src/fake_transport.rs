use crate::transport::{HttpTransport, TransportError};
use crate::types::{ApiRequest, ApiResponse};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

type Responder = Box<dyn Fn(&ApiRequest) -> Result<ApiResponse, TransportError> + Send + Sync>;

/// Scripted backend: every request is recorded and answered by a closure.
pub struct FakeTransport {
    responder: Responder,
    requests: Mutex<Vec<ApiRequest>>,
    pub send_calls: AtomicU64,
    pub delay: Option<Duration>,
}

impl FakeTransport {
    pub fn new(
        responder: impl Fn(&ApiRequest) -> Result<ApiResponse, TransportError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
            send_calls: AtomicU64::new(0),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn requests_to(&self, path: &str) -> Vec<ApiRequest> {
        self.requests()
            .into_iter()
            .filter(|r| path_of(r) == path)
            .collect()
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        self.send_calls.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut guard) = self.requests.lock() {
            guard.push(request.clone());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.responder)(&request)
    }
}

pub fn path_of(request: &ApiRequest) -> &str {
    let without_scheme = request
        .url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(&request.url);
    without_scheme
        .find('/')
        .map(|idx| &without_scheme[idx..])
        .unwrap_or("/")
}

pub fn bearer_of(request: &ApiRequest) -> Option<String> {
    request
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

pub fn body_of(request: &ApiRequest) -> Value {
    request
        .body
        .as_deref()
        .and_then(|b| serde_json::from_slice(b).ok())
        .unwrap_or(Value::Null)
}

pub fn json_response(status: u16, body: Value) -> Result<ApiResponse, TransportError> {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Ok(ApiResponse::new(status, body.to_string()))
}

pub fn empty_response(status: u16) -> Result<ApiResponse, TransportError> {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Ok(ApiResponse::new(status, Vec::new()))
}
