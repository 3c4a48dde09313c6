pub mod endpoints;
mod error;
mod request;
pub mod repositories;
pub mod testing;
mod transport;

pub use crate::error::{ApiError, ErrorResponse, ACCESS_TOKEN_INVALID, REFRESH_TOKEN_EXPIRED};
pub use crate::request::{ApiRequest, HttpRequest, HttpResponse, RequestData};
pub use crate::transport::{ReqwestTransport, Transport};
pub use reqwest::Method;

use async_trait::async_trait;
use repositories::*;
use secrecy::{ExposeSecret, SecretString};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3333";

/// Hook that sees every failed [`Client::execute`] call and decides its outcome.
#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn intercept(
        &self,
        client: &Client,
        request: HttpRequest,
        error: ApiError,
    ) -> Result<HttpResponse, ApiError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterceptorId(u64);

/// Shared HTTP client. Cloning is cheap and every clone sees the same
/// credential and interceptor.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    base_url: String,
    transport: Arc<dyn Transport>,
    credential: RwLock<Option<SecretString>>,
    interceptor: RwLock<Option<(InterceptorId, Arc<dyn Interceptor>)>>,
    next_interceptor_id: AtomicU64,
}

impl Client {
    pub fn new(base_url: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                base_url: base_url.into().trim_end_matches('/').to_string(),
                transport,
                credential: RwLock::new(None),
                interceptor: RwLock::new(None),
                next_interceptor_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn with_reqwest(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let transport = ReqwestTransport::new(timeout)?;
        Ok(Self::new(base_url, Arc::new(transport)))
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Replace the bearer credential attached to outgoing requests.
    pub fn set_credential(&self, token: Option<&str>) {
        let mut credential = self
            .inner
            .credential
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *credential = token.map(|t| SecretString::from(t.to_string()));
    }

    pub fn credential(&self) -> Option<String> {
        self.inner
            .credential
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|secret| secret.expose_secret().to_string())
    }

    /// Install `interceptor`, replacing any previous one.
    pub fn register_interceptor(&self, interceptor: Arc<dyn Interceptor>) -> InterceptorId {
        let id = InterceptorId(self.inner.next_interceptor_id.fetch_add(1, Ordering::Relaxed));
        let mut slot = self
            .inner
            .interceptor
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = Some((id, interceptor));
        tracing::debug!(id = id.0, "Interceptor registered");
        id
    }

    /// Remove the interceptor if `id` is still the installed one.
    pub fn unregister_interceptor(&self, id: InterceptorId) -> bool {
        let mut slot = self
            .inner
            .interceptor
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some((current, _)) if *current == id => {
                *slot = None;
                tracing::debug!(id = id.0, "Interceptor unregistered");
                true
            }
            _ => false,
        }
    }

    fn interceptor(&self) -> Option<Arc<dyn Interceptor>> {
        self.inner
            .interceptor
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|(_, interceptor)| Arc::clone(interceptor))
    }

    pub async fn send<R>(&self, request: R) -> Result<R::Response, ApiError>
    where
        R: ApiRequest,
    {
        let http_request = HttpRequest::from_request(&request)?;
        self.execute(http_request).await?.json()
    }

    /// Send `request` with the current credential, routing failures through the
    /// interceptor that was registered when the request went out.
    pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let request = match self.credential() {
            Some(token) if request.bearer().is_none() => request.with_bearer(token),
            _ => request,
        };
        let interceptor = self.interceptor();

        match self.dispatch(&request).await {
            Ok(response) => Ok(response),
            Err(error) => match interceptor {
                Some(interceptor) => interceptor.intercept(self, request, error).await,
                None => Err(error),
            },
        }
    }

    /// Send `request` exactly as given. No credential is added and the
    /// interceptor is bypassed.
    pub async fn dispatch(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        let url = format!("{}{}", self.inner.base_url, request.path);
        tracing::debug!(method = %request.method, path = %request.path, "Dispatching request");

        let response = self.inner.transport.execute(&url, request).await?;
        if response.is_success() {
            Ok(response)
        } else {
            tracing::debug!(
                status = response.status,
                path = %request.path,
                "Request failed"
            );
            Err(ApiError::Status {
                status: response.status,
                body: response.body,
            })
        }
    }
}

pub struct Request;

impl Request {
    pub fn sessions() -> SessionRepository {
        SessionRepository::new()
    }

    pub fn users() -> UserRepository {
        UserRepository::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{json_response, MockTransport};

    #[tokio::test]
    async fn test_execute_attaches_current_credential() {
        let transport = MockTransport::new();
        transport.on(Method::GET, "/users/me", |_| {
            Ok(json_response(200, serde_json::json!({})))
        });
        let client = Client::new(DEFAULT_BASE_URL, transport.clone());

        client.execute(HttpRequest::get("/users/me")).await.unwrap();
        client.set_credential(Some("T1"));
        client.execute(HttpRequest::get("/users/me")).await.unwrap();

        let calls = transport.calls();
        assert_eq!(calls[0].bearer, None);
        assert_eq!(calls[1].bearer.as_deref(), Some("T1"));
    }

    #[tokio::test]
    async fn test_bearer_override_wins() {
        let transport = MockTransport::new();
        transport.on(Method::GET, "/users/me", |_| {
            Ok(json_response(200, serde_json::json!({})))
        });
        let client = Client::new(DEFAULT_BASE_URL, transport.clone());
        client.set_credential(Some("T1"));

        client
            .execute(HttpRequest::get("/users/me").with_bearer("T2"))
            .await
            .unwrap();

        assert_eq!(transport.calls()[0].bearer.as_deref(), Some("T2"));
    }

    #[tokio::test]
    async fn test_failure_status_becomes_status_error() {
        let transport = MockTransport::new();
        transport.on(Method::GET, "/users/me", |_| {
            Ok(json_response(500, serde_json::json!({ "message": "boom" })))
        });
        let client = Client::new(DEFAULT_BASE_URL, transport);

        let err = client
            .execute(HttpRequest::get("/users/me"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 500, .. }));
        assert_eq!(err.server_message().as_deref(), Some("boom"));
    }

    struct Passthrough;

    #[async_trait]
    impl Interceptor for Passthrough {
        async fn intercept(
            &self,
            _client: &Client,
            _request: HttpRequest,
            _error: ApiError,
        ) -> Result<HttpResponse, ApiError> {
            Ok(HttpResponse::new(200, "{}"))
        }
    }

    #[tokio::test]
    async fn test_stale_unregister_keeps_newer_interceptor() {
        let transport = MockTransport::new();
        let client = Client::new(DEFAULT_BASE_URL, transport);

        let first = client.register_interceptor(Arc::new(Passthrough));
        let second = client.register_interceptor(Arc::new(Passthrough));

        assert!(!client.unregister_interceptor(first));
        // Unrouted paths answer 404, which the interceptor turns into a success
        assert!(client.execute(HttpRequest::get("/missing")).await.is_ok());

        assert!(client.unregister_interceptor(second));
        assert!(client.execute(HttpRequest::get("/missing")).await.is_err());
    }

    /// Answers every failure with a fixed status so tests can tell interceptors apart.
    struct Answer(u16);

    #[async_trait]
    impl Interceptor for Answer {
        async fn intercept(
            &self,
            _client: &Client,
            _request: HttpRequest,
            _error: ApiError,
        ) -> Result<HttpResponse, ApiError> {
            Ok(HttpResponse::new(self.0, "{}"))
        }
    }

    #[tokio::test]
    async fn test_failure_goes_to_interceptor_registered_at_send_time() {
        let transport = MockTransport::new();
        let gate = transport.on_gated(Method::GET, "/users/me", |_| {
            Ok(json_response(401, serde_json::json!({ "message": "token.invalid" })))
        });
        let client = Client::new(DEFAULT_BASE_URL, transport);
        let first = client.register_interceptor(Arc::new(Answer(201)));

        let in_flight = {
            let client = client.clone();
            tokio::spawn(async move { client.execute(HttpRequest::get("/users/me")).await })
        };
        gate.entered().await;

        client.unregister_interceptor(first);
        client.register_interceptor(Arc::new(Answer(202)));
        gate.open();

        assert_eq!(in_flight.await.unwrap().unwrap().status, 201);
    }
}
