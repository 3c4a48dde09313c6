use super::users::UserProfile;
use crate::request::{ApiRequest, RequestData};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

// Common

/// Access and refresh token as issued by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub token: String,
    pub refresh_token: String,
}

// Requests

#[derive(Debug, Clone, Serialize)]
pub struct CreateSession {
    email: String,
    password: String,
}

impl CreateSession {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl ApiRequest for CreateSession {
    type Data = Self;
    type Response = SessionResponse;

    const METHOD: Method = Method::POST;

    fn endpoint(&self) -> Cow<'_, str> {
        "/sessions".into()
    }

    fn data(&self) -> RequestData<&Self> {
        RequestData::Json(self)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshSession {
    refresh_token: String,
}

impl RefreshSession {
    pub fn new(refresh_token: impl Into<String>) -> Self {
        Self {
            refresh_token: refresh_token.into(),
        }
    }
}

impl ApiRequest for RefreshSession {
    type Data = Self;
    type Response = TokenPair;

    const METHOD: Method = Method::POST;

    fn endpoint(&self) -> Cow<'_, str> {
        "/sessions/refresh-token".into()
    }

    fn data(&self) -> RequestData<&Self> {
        RequestData::Json(self)
    }
}

// Responses

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub user: UserProfile,
    pub token: String,
    pub refresh_token: String,
}

impl SessionResponse {
    pub fn tokens(&self) -> TokenPair {
        TokenPair {
            token: self.token.clone(),
            refresh_token: self.refresh_token.clone(),
        }
    }
}
