use futures::FutureExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::watch;

use storefront_api::endpoints::sessions::SessionResponse;
use storefront_api::{ApiError, Client, HttpRequest, Request};

use super::coordinator::{Registration, SignOutFn, TokenRefreshCoordinator};
use super::session_store::SessionStore;
use crate::common::{Session, UserProfile};
use crate::error::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Unauthenticated,
    LoadingSession,
    Authenticated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub profile: Option<UserProfile>,
}

impl SessionSnapshot {
    fn signed_out() -> Self {
        Self {
            phase: SessionPhase::Unauthenticated,
            profile: None,
        }
    }
}

/// Process-wide session state: who is signed in, and the coordinator that
/// keeps their access token fresh.
#[derive(Clone)]
pub struct AuthContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    client: Client,
    store: Arc<dyn SessionStore>,
    refresh_timeout: Duration,
    state: watch::Sender<SessionSnapshot>,
    // Bumped whenever a session starts or ends
    generation: AtomicU64,
    registration: Mutex<Option<Registration>>,
    // Single writer for the cached profile
    profile_writer: tokio::sync::Mutex<()>,
}

impl AuthContext {
    pub fn new(client: Client, store: Arc<dyn SessionStore>, refresh_timeout: Duration) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::signed_out());
        Self {
            inner: Arc::new(ContextInner {
                client,
                store,
                refresh_timeout,
                state,
                generation: AtomicU64::new(0),
                registration: Mutex::new(None),
                profile_writer: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn client(&self) -> &Client {
        &self.inner.client
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.state.borrow().clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.state.borrow().phase
    }

    pub fn profile(&self) -> Option<UserProfile> {
        self.inner.state.borrow().profile.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.phase() == SessionPhase::LoadingSession
    }

    /// Watch session changes, e.g. to route back to sign-in after a forced sign-out.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.state.subscribe()
    }

    fn set_phase(&self, phase: SessionPhase) {
        self.inner.state.send_modify(|snapshot| snapshot.phase = phase);
    }

    fn set_snapshot(&self, phase: SessionPhase, profile: Option<UserProfile>) {
        self.inner.state.send_replace(SessionSnapshot { phase, profile });
    }

    fn current_generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    fn ensure_current(&self, generation: u64) -> Result<(), AuthError> {
        if self.current_generation() == generation {
            Ok(())
        } else {
            Err(AuthError::SessionEnded)
        }
    }

    fn take_registration(&self) -> Option<Registration> {
        self.inner
            .registration
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Install `token` as the credential and a fresh coordinator bound to a new
    /// session generation. Any previous coordinator is retired.
    fn begin_session(&self, token: &str) -> u64 {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.client.set_credential(Some(token));

        let registration = TokenRefreshCoordinator::register(
            &self.inner.client,
            self.inner.store.clone(),
            self.sign_out_callback(generation),
            self.inner.refresh_timeout,
        );
        let previous = self
            .inner
            .registration
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(registration);
        drop(previous);

        tracing::debug!(generation, "Session started");
        generation
    }

    /// Sign-out hook for the coordinator of `generation`. Does nothing once a
    /// newer session has started.
    fn sign_out_callback(&self, generation: u64) -> SignOutFn {
        let inner: Weak<ContextInner> = Arc::downgrade(&self.inner);
        Arc::new(move || {
            let inner = inner.clone();
            async move {
                let Some(inner) = inner.upgrade() else {
                    return;
                };
                let context = AuthContext { inner };
                if context.current_generation() != generation {
                    tracing::debug!(generation, "Ignoring sign-out from an earlier session");
                    return;
                }
                if let Err(e) = context.sign_out().await {
                    tracing::error!(error = %e, "Forced sign-out failed");
                }
            }
            .boxed()
        })
    }

    /// Drop the in-memory session without touching the store.
    fn end_session(&self) {
        let registration = self.take_registration();
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        drop(registration);
        self.inner.client.set_credential(None);
        self.set_snapshot(SessionPhase::Unauthenticated, None);
    }

    async fn fetch_listing_count(&self) -> Result<u32, AuthError> {
        let products = self.inner.client.send(Request::users().products()).await?;
        let active = products.iter().filter(|product| product.is_active).count();
        Ok(u32::try_from(active).unwrap_or(u32::MAX))
    }

    async fn fetch_profile(&self) -> Result<UserProfile, AuthError> {
        let mut profile = self.inner.client.send(Request::users().me()).await?;
        profile.active_listing_count = self.fetch_listing_count().await?;
        Ok(profile)
    }

    /// Load the persisted session at startup.
    pub async fn restore(&self) -> Result<SessionPhase, AuthError> {
        self.set_phase(SessionPhase::LoadingSession);

        let stored = async {
            let tokens = self.inner.store.get_tokens().await?;
            let profile = self.inner.store.get_profile().await?;
            Ok::<_, AuthError>((tokens, profile))
        }
        .await;

        let (tokens, cached_profile) = match stored {
            Ok(stored) => stored,
            Err(e) => {
                self.set_snapshot(SessionPhase::Unauthenticated, None);
                return Err(e);
            }
        };

        let Some(tokens) = tokens else {
            tracing::info!("No stored session");
            self.set_snapshot(SessionPhase::Unauthenticated, None);
            return Ok(SessionPhase::Unauthenticated);
        };

        let generation = self.begin_session(&tokens.token);

        let profile = match (self.fetch_profile().await, cached_profile) {
            (Ok(profile), _) => {
                self.ensure_current(generation)?;
                if let Err(e) = self.inner.store.save_profile(&profile).await {
                    tracing::warn!(error = %e, "Failed to cache profile");
                }
                profile
            }
            (Err(AuthError::Api(ApiError::Network(_) | ApiError::Timeout)), Some(cached)) => {
                tracing::warn!("Backend unreachable, restoring cached profile");
                self.ensure_current(generation)?;
                cached
            }
            (Err(e), _) => {
                tracing::warn!(error = %e, "Failed to restore session");
                // Auth failures were already handled by the coordinator; keep the
                // stored session for anything else so a later restore can retry
                if self.current_generation() == generation {
                    self.end_session();
                }
                return Err(e);
            }
        };

        tracing::info!(user = %profile.email, "Session restored");
        self.set_snapshot(SessionPhase::Authenticated, Some(profile));
        Ok(SessionPhase::Authenticated)
    }

    /// Create a session with email and password. A failed attempt leaves any
    /// current session untouched.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<UserProfile, AuthError> {
        let previous = self.snapshot();
        self.set_phase(SessionPhase::LoadingSession);

        // Raw dispatch: a rejected password must not reach the current session's coordinator
        let request = HttpRequest::from_request(&Request::sessions().create(email, password))?;
        let response = match self.inner.client.dispatch(&request).await {
            Ok(response) => response.json::<SessionResponse>(),
            Err(e) => Err(e),
        };

        let response = match response {
            Ok(response) => response,
            Err(error) => {
                self.inner.state.send_replace(previous);
                return Err(match error.into_server_error() {
                    ApiError::App {
                        status: 401,
                        message,
                    } => AuthError::InvalidCredentials(message),
                    other => AuthError::Api(other),
                });
            }
        };

        // Retire the previous coordinator before the new pair is stored, so a
        // refresh it still has in flight cannot overwrite it
        let session = Session::from(response.tokens());
        let generation = self.begin_session(&session.token);

        let mut profile = response.user;
        let result = async {
            self.inner.store.save_tokens(&session).await?;
            profile.active_listing_count = self.fetch_listing_count().await?;
            self.ensure_current(generation)?;
            self.inner.store.save_profile(&profile).await
        }
        .await;

        if let Err(e) = result {
            tracing::warn!(error = %e, "Sign-in could not complete, tearing session down");
            if self.current_generation() == generation {
                if let Err(sign_out_error) = self.sign_out().await {
                    tracing::error!(error = %sign_out_error, "Teardown after failed sign-in failed");
                }
            }
            return Err(e);
        }

        tracing::info!(user = %profile.email, "Signed in");
        self.set_snapshot(SessionPhase::Authenticated, Some(profile.clone()));
        Ok(profile)
    }

    /// End the session. Calling it while already signed out is a no-op.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let registration = self.take_registration();
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        let was_active = registration.is_some() || self.snapshot() != SessionSnapshot::signed_out();
        drop(registration);

        if !was_active {
            tracing::debug!("Already signed out");
            return Ok(());
        }

        let _writer = self.inner.profile_writer.lock().await;
        self.set_snapshot(SessionPhase::LoadingSession, None);
        self.inner.client.set_credential(None);

        let cleared = async {
            self.inner.store.clear_profile().await?;
            self.inner.store.clear_tokens().await
        }
        .await;

        self.set_snapshot(SessionPhase::Unauthenticated, None);
        tracing::info!("Signed out");
        cleared
    }

    /// Adjust the cached active listing count by `delta` and persist it.
    pub async fn update_active_listing_count(&self, delta: i32) -> Result<u32, AuthError> {
        let _writer = self.inner.profile_writer.lock().await;

        let mut updated = None;
        self.inner.state.send_if_modified(|snapshot| match snapshot.profile.as_mut() {
            Some(profile) => {
                profile.active_listing_count =
                    profile.active_listing_count.saturating_add_signed(delta);
                updated = Some(profile.clone());
                true
            }
            None => false,
        });

        let profile = updated.ok_or(AuthError::NotSignedIn)?;
        self.inner.store.save_profile(&profile).await?;
        Ok(profile.active_listing_count)
    }
}
