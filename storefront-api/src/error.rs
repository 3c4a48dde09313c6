use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 401 message the backend returns when a refresh token has expired.
pub const REFRESH_TOKEN_EXPIRED: &str = "Refresh token expirado.";

/// 401 message the backend returns when an access token is expired or unknown.
pub const ACCESS_TOKEN_INVALID: &str = "token.invalid";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    /// Transport-level failure, no response was received.
    #[error("Network error: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// A failure carrying the server-supplied message.
    #[error("{message}")]
    App { status: u16, message: String },

    #[error("Token refresh failed: {0}")]
    RefreshFailed(Box<ApiError>),

    #[error("Token refresh was abandoned before it completed")]
    RefreshAbandoned,

    #[error("Session ended")]
    SessionEnded,

    #[error("Request timed out")]
    Timeout,

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Session storage error: {0}")]
    Session(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } | ApiError::App { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The `message` field of the server's error payload, if there is one.
    pub fn server_message(&self) -> Option<String> {
        match self {
            ApiError::Status { body, .. } => parse_message(body),
            ApiError::App { message, .. } => Some(message.clone()),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// True for a 401 whose message is one of the two refreshable markers.
    pub fn is_token_expiry(&self) -> bool {
        self.is_unauthorized()
            && matches!(
                self.server_message().as_deref(),
                Some(REFRESH_TOKEN_EXPIRED | ACCESS_TOKEN_INVALID)
            )
    }

    /// Wrap a structured server payload into [`ApiError::App`]; anything else is
    /// returned unchanged.
    pub fn into_server_error(self) -> Self {
        match self {
            ApiError::Status { status, body } => match parse_message(&body) {
                Some(message) => ApiError::App { status, message },
                None => ApiError::Status { status, body },
            },
            other => other,
        }
    }
}

fn parse_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .map(|response| response.message)
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}

/// Error payload returned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unauthorized(message: &str) -> ApiError {
        ApiError::Status {
            status: 401,
            body: serde_json::json!({ "message": message }).to_string(),
        }
    }

    #[test]
    fn test_recognizes_both_expiry_markers() {
        assert!(unauthorized(ACCESS_TOKEN_INVALID).is_token_expiry());
        assert!(unauthorized(REFRESH_TOKEN_EXPIRED).is_token_expiry());
        assert!(!unauthorized("E-mail e/ou senha inválida.").is_token_expiry());
    }

    #[test]
    fn test_expiry_marker_requires_401() {
        let err = ApiError::Status {
            status: 403,
            body: r#"{"message":"token.invalid"}"#.to_string(),
        };
        assert!(!err.is_token_expiry());
    }

    #[test]
    fn test_into_server_error_wraps_message() {
        let err = ApiError::Status {
            status: 400,
            body: r#"{"message":"Produto não encontrado."}"#.to_string(),
        };
        assert_eq!(
            err.into_server_error(),
            ApiError::App {
                status: 400,
                message: "Produto não encontrado.".to_string()
            }
        );
    }

    #[test]
    fn test_into_server_error_keeps_unstructured_body() {
        let err = ApiError::Status {
            status: 502,
            body: "<html>Bad Gateway</html>".to_string(),
        };
        assert!(matches!(
            err.into_server_error(),
            ApiError::Status { status: 502, .. }
        ));
        assert_eq!(
            ApiError::Network("connection refused".into()).into_server_error(),
            ApiError::Network("connection refused".into())
        );
    }
}
