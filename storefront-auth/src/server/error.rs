use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use storefront_api::{ACCESS_TOKEN_INVALID, REFRESH_TOKEN_EXPIRED};
use thiserror::Error;

pub const INVALID_CREDENTIALS: &str = "E-mail e/ou senha inválida.";

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Missing, unknown or expired access token.
    #[error("Access token invalid")]
    AccessTokenInvalid,

    /// Unknown or expired refresh token.
    #[error("Refresh token expired")]
    RefreshTokenExpired,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ServerError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ServerError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, INVALID_CREDENTIALS.to_string())
            }
            ServerError::AccessTokenInvalid => {
                (StatusCode::UNAUTHORIZED, ACCESS_TOKEN_INVALID.to_string())
            }
            ServerError::RefreshTokenExpired => {
                (StatusCode::UNAUTHORIZED, REFRESH_TOKEN_EXPIRED.to_string())
            }
            ServerError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ServerError::Configuration(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            ServerError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "message": message,
        }));

        (status, body).into_response()
    }
}

impl From<config::ConfigError> for ServerError {
    fn from(err: config::ConfigError) -> Self {
        ServerError::Configuration(format!("Configuration error: {}", err))
    }
}
