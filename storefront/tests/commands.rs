use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use storefront::commands;
use storefront_api::testing::{json_response, unauthorized, MockTransport};
use storefront_api::{Client, Method, DEFAULT_BASE_URL, REFRESH_TOKEN_EXPIRED};
use storefront_auth::{AuthContext, MemorySessionStore, Session, SessionPhase, SessionStore};

fn context_with(transport: &Arc<MockTransport>, store: Arc<MemorySessionStore>) -> AuthContext {
    let client = Client::new(DEFAULT_BASE_URL, transport.clone());
    AuthContext::new(client, store, Duration::from_secs(5))
}

fn backend() -> Arc<MockTransport> {
    let transport = MockTransport::new();
    transport.on(Method::POST, "/sessions", |request| {
        let body = request.body.clone().unwrap_or_default();
        if body["password"] == "123456" {
            Ok(json_response(
                200,
                json!({
                    "user": { "id": "u1", "name": "Ana", "email": "ana@example.com", "tel": "11 99999-0000" },
                    "token": "T1",
                    "refresh_token": "RT1",
                }),
            ))
        } else {
            Ok(unauthorized("E-mail e/ou senha inválida."))
        }
    });
    transport.on(Method::GET, "/users/products", |_| {
        Ok(json_response(
            200,
            json!([
                { "id": "p1", "name": "Tênis", "price": 5990, "is_new": true, "is_active": true },
                { "id": "p2", "name": "Bicicleta", "price": 120000, "is_new": false, "is_active": false },
            ]),
        ))
    });
    transport
}

#[tokio::test]
async fn test_login_then_whoami() {
    let transport = backend();
    let context = context_with(&transport, Arc::new(MemorySessionStore::new()));

    let output = commands::login(&context, "ana@example.com", "123456")
        .await
        .unwrap();
    assert_eq!(output, "Signed in as Ana <ana@example.com> (1 active listings)");

    let output = commands::whoami(&context).await.unwrap();
    assert_eq!(
        output,
        "Ana <ana@example.com>\nPhone: 11 99999-0000\nActive listings: 1"
    );
}

#[tokio::test]
async fn test_login_with_wrong_password() {
    let transport = backend();
    let context = context_with(&transport, Arc::new(MemorySessionStore::new()));

    let err = commands::login(&context, "ana@example.com", "nope")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Login failed: E-mail e/ou senha inválida.");
}

#[tokio::test]
async fn test_commands_require_session() {
    let transport = backend();
    let context = context_with(&transport, Arc::new(MemorySessionStore::new()));

    let err = commands::whoami(&context).await.unwrap_err();
    assert_eq!(err.to_string(), commands::NOT_SIGNED_IN);
    assert_eq!(commands::logout(&context).await.unwrap(), "Not signed in");
}

#[tokio::test]
async fn test_listings_reconciles_active_count() {
    let transport = backend();
    let store = Arc::new(MemorySessionStore::new());
    let context = context_with(&transport, store.clone());
    commands::login(&context, "ana@example.com", "123456")
        .await
        .unwrap();
    context.update_active_listing_count(4).await.unwrap();

    let output = commands::listings(&context).await.unwrap();

    assert!(output.contains("R$ 59,90"));
    assert!(output.ends_with("1 active of 2"));
    assert_eq!(context.profile().unwrap().active_listing_count, 1);
    assert_eq!(store.get_profile().await.unwrap().unwrap().active_listing_count, 1);
}

#[tokio::test]
async fn test_listings_reports_forced_sign_out() {
    let transport = backend();
    let store = Arc::new(MemorySessionStore::new());
    let context = context_with(&transport, store.clone());
    commands::login(&context, "ana@example.com", "123456")
        .await
        .unwrap();

    transport.on(Method::GET, "/users/products", |_| {
        Ok(unauthorized(storefront_api::ACCESS_TOKEN_INVALID))
    });
    transport.on(Method::POST, "/sessions/refresh-token", |_| {
        Ok(unauthorized(REFRESH_TOKEN_EXPIRED))
    });

    let err = commands::listings(&context).await.unwrap_err();

    assert_eq!(err.to_string(), commands::SESSION_ENDED);
    assert_eq!(context.phase(), SessionPhase::Unauthenticated);
    assert_eq!(store.get_tokens().await.unwrap(), None::<Session>);
}

#[tokio::test]
async fn test_logout_clears_store() {
    let transport = backend();
    let store = Arc::new(MemorySessionStore::new());
    let context = context_with(&transport, store.clone());
    commands::login(&context, "ana@example.com", "123456")
        .await
        .unwrap();

    assert_eq!(commands::logout(&context).await.unwrap(), "Signed out");
    assert_eq!(store.get_tokens().await.unwrap(), None);
    assert_eq!(context.client().credential(), None);
}
