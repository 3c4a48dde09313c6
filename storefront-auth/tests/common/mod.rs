#![allow(dead_code)]

use futures::FutureExt;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use storefront_api::testing::{json_response, unauthorized, MockTransport};
use storefront_api::{Client, Method, ACCESS_TOKEN_INVALID, DEFAULT_BASE_URL};
use storefront_auth::{MemorySessionStore, Session, SignOutFn, UserProfile};

pub const REFRESH_PATH: &str = "/sessions/refresh-token";
pub const REFRESH_TIMEOUT: Duration = Duration::from_secs(5);

pub fn session(token: &str, refresh_token: &str) -> Session {
    Session {
        token: token.to_string(),
        refresh_token: refresh_token.to_string(),
    }
}

pub fn profile(count: u32) -> UserProfile {
    UserProfile {
        id: "user-1".to_string(),
        name: "Ana Souza".to_string(),
        email: "ana@example.com".to_string(),
        avatar: Some("avatar.png".to_string()),
        tel: None,
        active_listing_count: count,
    }
}

pub fn user_json() -> serde_json::Value {
    json!({
        "id": "user-1",
        "name": "Ana Souza",
        "email": "ana@example.com",
        "avatar": "avatar.png",
    })
}

pub fn client_for(transport: &Arc<MockTransport>) -> Client {
    Client::new(DEFAULT_BASE_URL, transport.clone())
}

/// Client already holding `token`, with a store holding `token`/`refresh_token`.
pub fn session_client(
    transport: &Arc<MockTransport>,
    token: &str,
    refresh_token: &str,
) -> (Client, Arc<MemorySessionStore>) {
    let client = client_for(transport);
    client.set_credential(Some(token));
    let store = Arc::new(MemorySessionStore::with_session(
        session(token, refresh_token),
        None,
    ));
    (client, store)
}

/// `GET path` answers 200 for any of `valid` tokens and an expired-token 401 otherwise.
pub fn require_token(transport: &MockTransport, path: &str, valid: &[&str]) {
    let valid: Vec<String> = valid.iter().map(|t| t.to_string()).collect();
    transport.on(Method::GET, path, move |request| {
        match request.bearer() {
            Some(token) if valid.iter().any(|v| v == token) => {
                Ok(json_response(200, json!({ "ok": true })))
            }
            _ => Ok(unauthorized(ACCESS_TOKEN_INVALID)),
        }
    });
}

/// Products route: two listings (one inactive) for any of `valid` tokens.
pub fn products_route(transport: &MockTransport, valid: &[&str]) {
    let valid: Vec<String> = valid.iter().map(|t| t.to_string()).collect();
    transport.on(Method::GET, "/users/products", move |request| {
        match request.bearer() {
            Some(token) if valid.iter().any(|v| v == token) => Ok(json_response(
                200,
                json!([
                    { "id": "p1", "name": "Tênis", "price": 5990, "is_new": true, "is_active": true },
                    { "id": "p2", "name": "Bicicleta", "price": 120000, "is_new": false, "is_active": false },
                ]),
            )),
            _ => Ok(unauthorized(ACCESS_TOKEN_INVALID)),
        }
    });
}

pub fn refresh_ok(token: &str, refresh_token: &str) -> serde_json::Value {
    json!({ "token": token, "refresh_token": refresh_token })
}

pub fn counting_sign_out() -> (SignOutFn, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    let sign_out: SignOutFn = Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async {}.boxed()
    });
    (sign_out, count)
}

/// Give every runnable task a chance to reach its next suspension point.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
