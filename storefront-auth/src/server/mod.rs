//! Development backend speaking the storefront session protocol.

pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;

pub use config::Configuration;
pub use error::ServerError;

use axum::{
    routing::{get, post},
    Router,
};
use services::TokenStore;
use std::sync::Arc;
use storefront_api::endpoints::users::ProductSummary;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub tokens: Arc<TokenStore>,
    pub configuration: Arc<Configuration>,
    pub listings: Arc<Vec<ProductSummary>>,
}

impl AppState {
    pub fn new(configuration: Configuration) -> Self {
        let tokens = TokenStore::new(
            configuration.server.access_token_ttl_seconds,
            configuration.server.refresh_token_ttl_seconds,
        );
        Self {
            tokens: Arc::new(tokens),
            configuration: Arc::new(configuration),
            listings: Arc::new(handlers::demo_listings()),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/sessions", post(handlers::create_session))
        .route("/sessions/refresh-token", post(handlers::refresh_token))
        .route("/users/me", get(handlers::current_user))
        .route("/users/products", get(handlers::user_products))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
