use serde::{Deserialize, Serialize};
use storefront_api::endpoints::sessions::TokenPair;

pub use storefront_api::endpoints::users::UserProfile;

/// Persisted credentials. Both tokens are always written together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub refresh_token: String,
}

impl From<TokenPair> for Session {
    fn from(tokens: TokenPair) -> Self {
        Self {
            token: tokens.token,
            refresh_token: tokens.refresh_token,
        }
    }
}
