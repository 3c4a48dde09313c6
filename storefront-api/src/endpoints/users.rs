use crate::request::ApiRequest;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

// Common

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub tel: Option<String>,
    /// Not sent by the backend; derived from the user's product list.
    #[serde(default)]
    pub active_listing_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub price: i64,
    #[serde(default)]
    pub is_new: bool,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

// Requests

#[derive(Default, Debug, Clone)]
pub struct GetCurrentUser;

impl ApiRequest for GetCurrentUser {
    type Data = ();
    type Response = UserProfile;

    fn endpoint(&self) -> Cow<'_, str> {
        "/users/me".into()
    }
}

#[derive(Default, Debug, Clone)]
pub struct ListUserProducts;

impl ApiRequest for ListUserProducts {
    type Data = ();
    type Response = Vec<ProductSummary>;

    fn endpoint(&self) -> Cow<'_, str> {
        "/users/products".into()
    }
}
