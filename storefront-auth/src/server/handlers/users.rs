use axum::{extract::State, http::HeaderMap, Json};
use storefront_api::endpoints::users::ProductSummary;

use super::authenticate;
use crate::server::{error::ServerError, models::UserResponse, AppState};

pub async fn current_user(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UserResponse>, ServerError> {
    let user_id = authenticate(&state, &headers)?;
    let user = &state.configuration.demo;
    if user.id != user_id {
        return Err(ServerError::NotFound("Usuário não encontrado.".to_string()));
    }
    Ok(Json(UserResponse::from(user)))
}

pub async fn user_products(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ProductSummary>>, ServerError> {
    let user_id = authenticate(&state, &headers)?;
    tracing::debug!(user_id = %user_id, count = state.listings.len(), "Listing products");
    Ok(Json(state.listings.as_ref().clone()))
}

/// Listings owned by the demo user.
pub fn demo_listings() -> Vec<ProductSummary> {
    [
        ("Tênis vermelho", 5990, true, true),
        ("Bicicleta aro 29", 120_000, false, true),
        ("Luminária pendente", 4500, false, false),
    ]
    .into_iter()
    .enumerate()
    .map(|(i, (name, price, is_new, is_active))| ProductSummary {
        id: format!("product-{}", i + 1),
        name: name.to_string(),
        price,
        is_new,
        is_active,
    })
    .collect()
}
