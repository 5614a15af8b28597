//! Shared fixtures for the client tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use api_core::{
    ApiContext, HttpRequest, HttpResponse, MemoryTokenStore, RetryPolicy, ServiceConfig,
    ServiceName, ServicesConfig, TokenStore, Transport, TransportError,
};
use async_trait::async_trait;
use tokio::time::Instant;

pub const RETRY_DELAY: Duration = Duration::from_millis(1000);

/// One request as the transport saw it.
#[derive(Debug, Clone)]
pub struct Seen {
    pub request: HttpRequest,
    pub timeout: Duration,
    pub at: Instant,
}

/// Transport that replays queued outcomes in order and records every
/// attempt. Once the queue is empty it answers with an empty success
/// envelope.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    seen: Mutex<Vec<Seen>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, outcome: Result<HttpResponse, TransportError>) -> &Self {
        self.script.lock().unwrap().push_back(outcome);
        self
    }

    pub fn push_status(&self, status: u16) -> &Self {
        self.push(Ok(HttpResponse::new(status, "")))
    }

    pub fn push_envelope(&self, data: serde_json::Value) -> &Self {
        self.push(Ok(envelope(200, "ok", data)))
    }

    pub fn push_connect_error(&self) -> &Self {
        self.push(Err(TransportError::Connect("connection refused".to_string())))
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(
        &self,
        request: &HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        self.seen.lock().unwrap().push(Seen {
            request: request.clone(),
            timeout,
            at: Instant::now(),
        });
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(envelope(200, "ok", serde_json::Value::Null)))
    }
}

pub fn envelope(code: i64, message: &str, data: serde_json::Value) -> HttpResponse {
    let body = serde_json::json!({
        "code": code,
        "message": message,
        "data": data,
        "success": code == 200,
    });
    HttpResponse::new(200, body.to_string())
}

pub const JSON_CONTENT_TYPE: &str = "application/json;charset=UTF-8";

/// All four services pointed at `base`, sending JSON by default.
pub fn services_at(base: &str) -> ServicesConfig {
    ServiceName::ALL
        .into_iter()
        .fold(ServicesConfig::empty(), |services, name| {
            services.with_service(
                name,
                ServiceConfig::new(base).with_header("Content-Type", JSON_CONTENT_TYPE),
            )
        })
}

/// Context over a scripted transport, with its token store exposed.
pub fn scripted_context(transport: Arc<ScriptedTransport>) -> (ApiContext, Arc<MemoryTokenStore>) {
    let tokens = Arc::new(MemoryTokenStore::new());
    let context = ApiContext::builder()
        .services(services_at("http://api.test"))
        .retry(RetryPolicy::new(3, RETRY_DELAY))
        .tokens(tokens.clone() as Arc<dyn TokenStore>)
        .transport(transport as Arc<dyn Transport>)
        .build()
        .unwrap();
    (context, tokens)
}

pub fn user_json(id: &str, username: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "username": username,
        "email": format!("{username}@example.com"),
        "status": "active",
        "createdAt": "2024-01-01T00:00:00Z",
        "updatedAt": "2024-01-01T00:00:00Z",
    })
}
