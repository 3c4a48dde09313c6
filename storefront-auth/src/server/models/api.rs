use serde::{Deserialize, Serialize};

use crate::server::config::DemoUser;
use storefront_api::endpoints::sessions::TokenPair;

// POST /sessions
#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub user: UserResponse,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

// POST /sessions/refresh-token
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

// GET /users/me
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub avatar: Option<String>,
    pub tel: Option<String>,
}

impl From<&DemoUser> for UserResponse {
    fn from(user: &DemoUser) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            avatar: None,
            tel: user.tel.clone(),
        }
    }
}

// Health check
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
