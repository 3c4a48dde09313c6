//! Single-flight access token refresh.
//!
//! The coordinator is installed as the [`Client`]'s interceptor for the
//! lifetime of one session. When requests fail because the access token
//! expired, the first one to notice becomes the leader and performs the
//! refresh; every other request that fails while the refresh is running parks
//! on a one-shot channel. The leader settles all parked requests in arrival
//! order, then replays its own request.
//!
//! The refresh call and all replays go through [`Client::dispatch`], which
//! bypasses the interceptor, so a failing refresh can never recurse into the
//! coordinator.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;

use storefront_api::endpoints::sessions::TokenPair;
use storefront_api::{
    ApiError, Client, HttpRequest, HttpResponse, Interceptor, InterceptorId, Request,
};

use super::session_store::SessionStore;
use crate::common::Session;

/// Escalation hook invoked when the session can no longer be used.
pub type SignOutFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

pub struct TokenRefreshCoordinator {
    store: Arc<dyn SessionStore>,
    sign_out: SignOutFn,
    refresh_timeout: Duration,
    state: Mutex<RefreshState>,
    retired: AtomicBool,
}

#[derive(Default)]
struct RefreshState {
    in_progress: bool,
    pending: VecDeque<PendingRequest>,
    /// Last access token this coordinator installed on the client.
    last_issued: Option<String>,
}

/// A request parked behind the in-flight refresh. Resolved with the new
/// access token, or rejected with the refresh error.
struct PendingRequest {
    reply: oneshot::Sender<Result<String, ApiError>>,
}

enum Turn<'a> {
    Lead(RefreshGuard<'a>),
    Wait(oneshot::Receiver<Result<String, ApiError>>),
    Replay(String),
    /// The credential changed since the request was sent, but not through
    /// this coordinator.
    Stale,
}

/// Held by the leader while it refreshes. Dropping it unsettled (the leader
/// was cancelled) releases every parked request.
struct RefreshGuard<'a> {
    coordinator: &'a TokenRefreshCoordinator,
    settled: bool,
}

impl RefreshGuard<'_> {
    /// Clear the in-progress flag and answer every parked request in FIFO
    /// order. On success the client's credential is switched in the same
    /// critical section, so no request can observe "idle" with the old token.
    ///
    /// Returns false if the coordinator was retired first. The outcome is then
    /// replaced by [`ApiError::SessionEnded`] and the credential is left alone.
    fn settle(mut self, client: &Client, outcome: Result<String, ApiError>) -> bool {
        self.settled = true;

        let (live, outcome, pending) = {
            let mut state = self.coordinator.lock_state();
            let live = !self.coordinator.is_retired();
            let outcome = if live {
                outcome
            } else {
                Err(ApiError::SessionEnded)
            };
            if let Ok(token) = &outcome {
                client.set_credential(Some(token));
                state.last_issued = Some(token.clone());
            }
            state.in_progress = false;
            (live, outcome, std::mem::take(&mut state.pending))
        };

        tracing::debug!(pending = pending.len(), success = outcome.is_ok(), "Settling refresh");
        for entry in pending {
            // The waiter may have been cancelled
            let _ = entry.reply.send(outcome.clone());
        }
        live
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        let pending = {
            let mut state = self.coordinator.lock_state();
            state.in_progress = false;
            std::mem::take(&mut state.pending)
        };

        tracing::warn!(pending = pending.len(), "Token refresh abandoned");
        for entry in pending {
            let _ = entry.reply.send(Err(ApiError::RefreshAbandoned));
        }
    }
}

impl TokenRefreshCoordinator {
    /// Install a coordinator on `client`. The returned [`Registration`] removes
    /// it again when unregistered or dropped.
    pub fn register(
        client: &Client,
        store: Arc<dyn SessionStore>,
        sign_out: SignOutFn,
        refresh_timeout: Duration,
    ) -> Registration {
        let coordinator = Arc::new(Self {
            store,
            sign_out,
            refresh_timeout,
            state: Mutex::new(RefreshState::default()),
            retired: AtomicBool::new(false),
        });
        let id = client.register_interceptor(coordinator.clone());

        Registration {
            client: client.clone(),
            id,
            coordinator,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    /// Decide, atomically, whether this request leads a refresh, waits for the
    /// running one, or can be replayed right away because this coordinator
    /// already refreshed the credential after it was sent.
    fn take_turn(&self, client: &Client, sent_with: Option<&str>) -> Turn<'_> {
        let mut state = self.lock_state();

        if state.in_progress {
            let (reply, receiver) = oneshot::channel();
            state.pending.push_back(PendingRequest { reply });
            return Turn::Wait(receiver);
        }

        if let Some(current) = client.credential() {
            if sent_with != Some(current.as_str()) {
                if state.last_issued.as_deref() == Some(current.as_str()) {
                    return Turn::Replay(current);
                }
                return Turn::Stale;
            }
        }

        state.in_progress = true;
        Turn::Lead(RefreshGuard {
            coordinator: self,
            settled: false,
        })
    }

    async fn escalate(&self, reason: &str) {
        if self.is_retired() {
            tracing::debug!(reason, "Coordinator retired, not signing out");
            return;
        }
        tracing::warn!(reason, "Ending session");
        (self.sign_out)().await;
    }

    async fn lead_refresh(
        &self,
        client: &Client,
        request: HttpRequest,
        refresh_token: &str,
        guard: RefreshGuard<'_>,
    ) -> Result<HttpResponse, ApiError> {
        tracing::info!(path = %request.path, "Access token expired, refreshing");

        let refresh = self.refresh(client, refresh_token);
        let outcome = match tokio::time::timeout(self.refresh_timeout, refresh).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ApiError::Timeout),
        };

        let outcome = outcome
            .map(|tokens| tokens.token)
            .map_err(|error| ApiError::RefreshFailed(Box::new(error.into_server_error())));

        if !guard.settle(client, outcome.clone()) {
            tracing::warn!("Refresh finished after its session ended, discarding result");
            return Err(ApiError::SessionEnded);
        }

        match outcome {
            Ok(token) => {
                tracing::info!("Token refresh successful");
                // Let the parked requests go out before the one that triggered the refresh
                tokio::task::yield_now().await;
                replay(client, request, &token).await
            }
            Err(error) => {
                tracing::error!(%error, "Token refresh failed");
                self.escalate("token refresh failed").await;
                Err(error)
            }
        }
    }

    /// Exchange the refresh token and persist the new pair. Never retried.
    async fn refresh(&self, client: &Client, refresh_token: &str) -> Result<TokenPair, ApiError> {
        let request = HttpRequest::from_request(&Request::sessions().refresh(refresh_token))?;
        let tokens: TokenPair = client.dispatch(&request).await?.json()?;

        let saved = self
            .store
            .save_tokens_if(&Session::from(tokens.clone()), &|| !self.is_retired())
            .await
            .map_err(|e| ApiError::Session(e.to_string()))?;
        if !saved {
            return Err(ApiError::SessionEnded);
        }

        Ok(tokens)
    }
}

async fn replay(
    client: &Client,
    request: HttpRequest,
    token: &str,
) -> Result<HttpResponse, ApiError> {
    let request = request.with_bearer(token);
    tracing::debug!(path = %request.path, "Replaying request with refreshed token");
    client
        .dispatch(&request)
        .await
        .map_err(ApiError::into_server_error)
}

#[async_trait]
impl Interceptor for TokenRefreshCoordinator {
    async fn intercept(
        &self,
        client: &Client,
        request: HttpRequest,
        error: ApiError,
    ) -> Result<HttpResponse, ApiError> {
        if self.is_retired() {
            tracing::debug!(path = %request.path, "Request outlived its session");
            return Err(ApiError::SessionEnded);
        }

        if !error.is_unauthorized() {
            return Err(error.into_server_error());
        }

        if !error.is_token_expiry() {
            self.escalate("unauthorized without an expiry marker").await;
            return Err(error.into_server_error());
        }

        let refresh_token = match self.store.get_tokens().await {
            Ok(Some(session)) => session.refresh_token,
            Ok(None) => {
                self.escalate("no refresh token stored").await;
                return Err(error);
            }
            Err(e) => return Err(ApiError::Session(e.to_string())),
        };

        match self.take_turn(client, request.bearer()) {
            Turn::Lead(guard) => {
                self.lead_refresh(client, request, &refresh_token, guard)
                    .await
            }
            Turn::Wait(receiver) => {
                tracing::debug!(path = %request.path, "Refresh in progress, queueing request");
                match receiver.await {
                    Ok(Ok(token)) => replay(client, request, &token).await,
                    Ok(Err(error)) => Err(error),
                    Err(_) => Err(ApiError::RefreshAbandoned),
                }
            }
            Turn::Replay(token) => {
                tracing::debug!(path = %request.path, "Credential already refreshed");
                replay(client, request, &token).await
            }
            Turn::Stale => {
                tracing::debug!(path = %request.path, "Credential replaced elsewhere, not refreshing");
                Err(error.into_server_error())
            }
        }
    }
}

/// Keeps a coordinator installed. Unregistering retires the coordinator: it
/// stops signing out, persisting tokens, or touching the credential, even if
/// one of its refreshes is still in flight.
pub struct Registration {
    client: Client,
    id: InterceptorId,
    coordinator: Arc<TokenRefreshCoordinator>,
}

impl Registration {
    pub fn unregister(self) {
        drop(self);
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        {
            // Retire under the state lock so settle observes it atomically
            let _state = self.coordinator.lock_state();
            self.coordinator.retired.store(true, Ordering::SeqCst);
        }
        self.client.unregister_interceptor(self.id);
    }
}
