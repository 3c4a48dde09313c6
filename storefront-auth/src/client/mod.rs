mod config;
mod context;
mod coordinator;
mod session_store;

pub use config::Settings;
pub use context::{AuthContext, SessionPhase, SessionSnapshot};
pub use coordinator::{Registration, SignOutFn, TokenRefreshCoordinator};
pub use session_store::{FileSessionStore, MemorySessionStore, SessionStore};

use std::sync::Arc;
use storefront_api::Client;

use crate::error::AuthError;

/// Build the client and session context from `settings` and restore any
/// persisted session. A session that cannot be restored leaves the context
/// signed out rather than failing.
pub async fn connect(settings: &Settings) -> Result<AuthContext, AuthError> {
    settings.validate().map_err(AuthError::Configuration)?;

    let client = Client::with_reqwest(settings.api_url.clone(), settings.request_timeout())?;
    let store = match &settings.data_dir {
        Some(dir) => FileSessionStore::in_dir(dir)?,
        None => FileSessionStore::new()?,
    };

    let context = AuthContext::new(client, Arc::new(store), settings.refresh_timeout());
    match context.restore().await {
        Ok(phase) => tracing::info!(?phase, api_url = %settings.api_url, "Session context ready"),
        Err(e) => tracing::warn!(error = %e, "Could not restore session, continuing signed out"),
    }

    Ok(context)
}
