use axum::{extract::State, Json};
use storefront_api::endpoints::sessions::TokenPair;

use crate::server::{
    error::ServerError,
    models::{CreateSessionRequest, CreateSessionResponse, RefreshRequest, UserResponse},
    AppState,
};

pub async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<CreateSessionResponse>, ServerError> {
    let span = tracing::info_span!("create_session", email = %req.email);
    let _enter = span.enter();

    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(ServerError::BadRequest(
            "Informe o e-mail e a senha.".to_string(),
        ));
    }

    let user = &state.configuration.demo;
    if !req.email.eq_ignore_ascii_case(&user.email) || req.password != user.password {
        tracing::warn!("Invalid credentials");
        return Err(ServerError::InvalidCredentials);
    }

    let tokens = state.tokens.issue(&user.id);
    tracing::info!(user_id = %user.id, "Session created");

    Ok(Json(CreateSessionResponse {
        user: UserResponse::from(user),
        tokens,
    }))
}

pub async fn refresh_token(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, ServerError> {
    tracing::debug!("Token refresh requested");

    let tokens = state.tokens.rotate(&req.refresh_token).ok_or_else(|| {
        tracing::warn!("Refresh token unknown or expired");
        ServerError::RefreshTokenExpired
    })?;

    tracing::info!("Token refresh successful");
    Ok(Json(tokens))
}
