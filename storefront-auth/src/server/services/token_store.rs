use base64::Engine;
use chrono::{TimeDelta, Utc};
use dashmap::DashMap;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

use crate::server::models::{IssuedToken, TokenKind};
use storefront_api::endpoints::sessions::TokenPair;

/// Issued access and refresh tokens, keyed by their opaque value.
pub struct TokenStore {
    tokens: Arc<DashMap<String, IssuedToken>>,
    access_ttl: TimeDelta,
    refresh_ttl: TimeDelta,
}

impl TokenStore {
    pub fn new(access_ttl_seconds: u64, refresh_ttl_seconds: u64) -> Self {
        let store = Self {
            tokens: Arc::new(DashMap::new()),
            access_ttl: ttl(access_ttl_seconds),
            refresh_ttl: ttl(refresh_ttl_seconds),
        };

        // Spawn background cleanup task
        let tokens_clone = store.tokens.clone();
        tokio::spawn(async move {
            cleanup_expired_tokens(tokens_clone).await;
        });

        tracing::info!(
            "Token store initialized, access TTL {}s, refresh TTL {}s",
            access_ttl_seconds,
            refresh_ttl_seconds
        );
        store
    }

    /// Issue a fresh access/refresh pair for `user_id`.
    pub fn issue(&self, user_id: &str) -> TokenPair {
        let now = Utc::now();
        let token = generate_token();
        let refresh_token = generate_token();

        self.tokens.insert(
            token.clone(),
            IssuedToken {
                user_id: user_id.to_string(),
                kind: TokenKind::Access,
                expires_at: now + self.access_ttl,
            },
        );
        self.tokens.insert(
            refresh_token.clone(),
            IssuedToken {
                user_id: user_id.to_string(),
                kind: TokenKind::Refresh,
                expires_at: now + self.refresh_ttl,
            },
        );
        tracing::debug!(user_id = %user_id, "Issued token pair");

        TokenPair {
            token,
            refresh_token,
        }
    }

    /// Resolve an access token to its user. Expired tokens are evicted.
    pub fn authenticate(&self, token: &str) -> Option<String> {
        self.take_valid(token, TokenKind::Access, false)
    }

    /// Exchange a refresh token for a new pair. The old refresh token is
    /// consumed whether or not it was still valid.
    pub fn rotate(&self, refresh_token: &str) -> Option<TokenPair> {
        let user_id = self.take_valid(refresh_token, TokenKind::Refresh, true)?;
        tracing::debug!(user_id = %user_id, "Rotating refresh token");
        Some(self.issue(&user_id))
    }

    fn take_valid(&self, value: &str, kind: TokenKind, consume: bool) -> Option<String> {
        let now = Utc::now();
        let issued = self.tokens.get(value).map(|t| t.clone())?;
        if issued.kind != kind {
            return None;
        }

        if consume || issued.is_expired(now) {
            self.tokens.remove(value);
        }

        if issued.is_expired(now) {
            tracing::debug!(user_id = %issued.user_id, ?kind, "Token expired");
            None
        } else {
            Some(issued.user_id)
        }
    }

    /// Get token count (for monitoring)
    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }
}

// Ten years; keeps expiry arithmetic in range
const MAX_TTL_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

fn ttl(seconds: u64) -> TimeDelta {
    TimeDelta::seconds(seconds.min(MAX_TTL_SECONDS) as i64)
}

fn generate_token() -> String {
    let mut rng = rand::rng();
    let random_bytes: Vec<u8> = (0..32).map(|_| rng.random()).collect();
    base64::prelude::BASE64_URL_SAFE_NO_PAD.encode(&random_bytes)
}

/// Background task that periodically drops expired tokens
async fn cleanup_expired_tokens(tokens: Arc<DashMap<String, IssuedToken>>) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        let now = Utc::now();
        let initial_count = tokens.len();

        tokens.retain(|_, issued| !issued.is_expired(now));

        let cleaned = initial_count.saturating_sub(tokens.len());
        if cleaned > 0 {
            tracing::info!(
                "Cleaned up {} expired tokens, {} remaining",
                cleaned,
                tokens.len()
            );
        }
    }
}
