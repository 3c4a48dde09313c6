#![cfg(feature = "server")]

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use storefront_api::{ApiError, Client, HttpRequest, Method, Request, REFRESH_TOKEN_EXPIRED};
use storefront_auth::server::{self, config::Configuration, AppState};
use storefront_auth::{
    AuthContext, AuthError, MemorySessionStore, SessionPhase, SessionStore,
};

async fn spawn_server(access_ttl_seconds: u64) -> (String, Configuration) {
    let mut configuration = Configuration::default();
    configuration.server.access_token_ttl_seconds = access_ttl_seconds;

    let app = server::router(AppState::new(configuration.clone()));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), configuration)
}

fn context_for(base_url: &str) -> (AuthContext, Arc<MemorySessionStore>) {
    let client = Client::with_reqwest(base_url, Duration::from_secs(5)).unwrap();
    let store = Arc::new(MemorySessionStore::new());
    let context = AuthContext::new(client, store.clone(), Duration::from_secs(5));
    (context, store)
}

#[tokio::test]
async fn test_sign_in_against_dev_server() {
    let (base_url, configuration) = spawn_server(900).await;
    let (context, store) = context_for(&base_url);

    let profile = context
        .sign_in(&configuration.demo.email, &configuration.demo.password)
        .await
        .unwrap();

    assert_eq!(profile.email, configuration.demo.email);
    // Two of the three demo listings are active
    assert_eq!(profile.active_listing_count, 2);
    assert_eq!(context.phase(), SessionPhase::Authenticated);
    assert!(store.get_tokens().await.unwrap().is_some());
}

#[tokio::test]
async fn test_wrong_password_is_rejected() {
    let (base_url, configuration) = spawn_server(900).await;
    let (context, _store) = context_for(&base_url);

    let err = context
        .sign_in(&configuration.demo.email, "not-the-password")
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::InvalidCredentials(_)));
    assert_eq!(context.phase(), SessionPhase::Unauthenticated);
}

#[tokio::test]
async fn test_expired_access_token_is_refreshed_once() {
    let (base_url, configuration) = spawn_server(1).await;
    let (context, store) = context_for(&base_url);
    context
        .sign_in(&configuration.demo.email, &configuration.demo.password)
        .await
        .unwrap();
    let before = store.get_tokens().await.unwrap().unwrap();

    tokio::time::sleep(Duration::from_millis(1500)).await;

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let client = context.client().clone();
            tokio::spawn(async move { client.send(Request::users().products()).await })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().len(), 3);
    }

    // A second refresh would have presented the rotated-away refresh token
    // and ended the session
    assert_eq!(context.phase(), SessionPhase::Authenticated);
    let after = store.get_tokens().await.unwrap().unwrap();
    assert_ne!(after.token, before.token);
    assert_ne!(after.refresh_token, before.refresh_token);
    assert_eq!(context.client().credential(), Some(after.token));
}

#[tokio::test]
async fn test_rotated_refresh_token_is_rejected() {
    let (base_url, configuration) = spawn_server(900).await;
    let (context, store) = context_for(&base_url);
    context
        .sign_in(&configuration.demo.email, &configuration.demo.password)
        .await
        .unwrap();
    let session = store.get_tokens().await.unwrap().unwrap();

    let refresh = HttpRequest::post("/sessions/refresh-token")
        .with_json(&json!({ "refresh_token": session.refresh_token }))
        .unwrap();
    context.client().dispatch(&refresh).await.unwrap();

    let err = context
        .client()
        .dispatch(&refresh)
        .await
        .unwrap_err()
        .into_server_error();
    assert_eq!(
        err,
        ApiError::App {
            status: 401,
            message: REFRESH_TOKEN_EXPIRED.to_string()
        }
    );
}

#[tokio::test]
async fn test_health_check() {
    let (base_url, _) = spawn_server(900).await;
    let client = Client::with_reqwest(base_url, Duration::from_secs(5)).unwrap();

    let response = client
        .dispatch(&HttpRequest::new(Method::GET, "/health"))
        .await
        .unwrap();
    let body: serde_json::Value = response.json().unwrap();
    assert_eq!(body["status"], "healthy");
}
