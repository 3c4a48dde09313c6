mod sessions;
mod users;

pub use sessions::{create_session, refresh_token};
pub use users::{current_user, demo_listings, user_products};

use crate::server::{error::ServerError, models::HealthResponse, AppState};
use axum::{
    http::{header::AUTHORIZATION, HeaderMap},
    Json,
};

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Resolve the `Authorization: Bearer` header to a user id.
fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<String, ServerError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(ServerError::AccessTokenInvalid)?;

    state.tokens.authenticate(token).ok_or_else(|| {
        tracing::debug!("Rejected access token");
        ServerError::AccessTokenInvalid
    })
}
