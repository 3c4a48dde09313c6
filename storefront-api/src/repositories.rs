use crate::endpoints::{
    sessions::{CreateSession, RefreshSession},
    users::{GetCurrentUser, ListUserProducts},
};

pub struct SessionRepository;

impl SessionRepository {
    pub fn new() -> Self {
        Self {}
    }

    pub fn create(&self, email: impl Into<String>, password: impl Into<String>) -> CreateSession {
        CreateSession::new(email, password)
    }

    pub fn refresh(&self, refresh_token: impl Into<String>) -> RefreshSession {
        RefreshSession::new(refresh_token)
    }
}

pub struct UserRepository;

impl UserRepository {
    pub fn new() -> Self {
        Self {}
    }

    pub fn me(&self) -> GetCurrentUser {
        GetCurrentUser
    }

    pub fn products(&self) -> ListUserProducts {
        ListUserProducts
    }
}
