//! Scripted transport for tests.
//!
//! Routes are matched on method and path; the most recently added route wins.
//! A gated route parks every call until the test opens its [`Gate`], which is
//! how tests hold a request in flight while other requests pile up behind it.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, Semaphore};

use crate::error::ApiError;
use crate::request::{HttpRequest, HttpResponse};
use crate::transport::Transport;

pub type Responder = Arc<dyn Fn(&HttpRequest) -> Result<HttpResponse, ApiError> + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub bearer: Option<String>,
    pub body: Option<Value>,
}

pub struct Gate {
    entered: Semaphore,
    open: watch::Sender<bool>,
}

impl Gate {
    fn new() -> Self {
        Self {
            entered: Semaphore::new(0),
            open: watch::channel(false).0,
        }
    }

    /// Wait until a call has reached the gate.
    pub async fn entered(&self) {
        if let Ok(permit) = self.entered.acquire().await {
            permit.forget();
        }
    }

    /// Let every parked and future call through.
    pub fn open(&self) {
        self.open.send_replace(true);
    }

    async fn pass(&self) {
        self.entered.add_permits(1);
        let mut open = self.open.subscribe();
        let _ = open.wait_for(|open| *open).await;
    }
}

struct Route {
    method: Method,
    path: String,
    responder: Responder,
    gate: Option<Arc<Gate>>,
}

#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on<F>(&self, method: Method, path: &str, responder: F)
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse, ApiError> + Send + Sync + 'static,
    {
        self.add_route(method, path, Arc::new(responder), None);
    }

    /// Like [`MockTransport::on`], but calls wait on the returned gate.
    pub fn on_gated<F>(&self, method: Method, path: &str, responder: F) -> Arc<Gate>
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse, ApiError> + Send + Sync + 'static,
    {
        let gate = Arc::new(Gate::new());
        self.add_route(method, path, Arc::new(responder), Some(gate.clone()));
        gate
    }

    fn add_route(&self, method: Method, path: &str, responder: Responder, gate: Option<Arc<Gate>>) {
        self.routes.lock().unwrap().push(Route {
            method,
            path: path.to_string(),
            responder,
            gate,
        });
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, path: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.path == path)
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, _url: &str, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        self.calls.lock().unwrap().push(RecordedCall {
            method: request.method.clone(),
            path: request.path.clone(),
            bearer: request.bearer().map(str::to_string),
            body: request.body.clone(),
        });

        let route = self
            .routes
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|route| route.method == request.method && route.path == request.path)
            .map(|route| (route.responder.clone(), route.gate.clone()));

        let Some((responder, gate)) = route else {
            return Ok(json_response(404, serde_json::json!({ "message": "Not found" })));
        };

        if let Some(gate) = gate {
            gate.pass().await;
        }
        responder(request)
    }
}

pub fn json_response(status: u16, body: Value) -> HttpResponse {
    HttpResponse::new(status, body.to_string())
}

/// A 401 carrying `message` in the backend's error shape.
pub fn unauthorized(message: &str) -> HttpResponse {
    json_response(401, serde_json::json!({ "message": message }))
}
