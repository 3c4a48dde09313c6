use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::common::{Session, UserProfile};
use crate::error::AuthError;

/// Durable storage for the session tokens and the cached user profile.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get_tokens(&self) -> Result<Option<Session>, AuthError>;
    async fn save_tokens(&self, session: &Session) -> Result<(), AuthError>;
    async fn clear_tokens(&self) -> Result<(), AuthError>;

    /// Save `session` only if `still_current()` holds, checked under the same
    /// lock as the write. Returns whether the tokens were written.
    async fn save_tokens_if(
        &self,
        session: &Session,
        still_current: &(dyn Fn() -> bool + Send + Sync),
    ) -> Result<bool, AuthError>;

    async fn get_profile(&self) -> Result<Option<UserProfile>, AuthError>;
    async fn save_profile(&self, profile: &UserProfile) -> Result<(), AuthError>;
    async fn clear_profile(&self) -> Result<(), AuthError>;
}

/// JSON files in a private directory. Writes go through a temp file and a
/// rename, so a reader never sees half of a token pair.
pub struct FileSessionStore {
    session_path: PathBuf,
    profile_path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileSessionStore {
    pub fn new() -> Result<Self, AuthError> {
        Self::in_dir(Self::get_data_dir()?)
    }

    pub fn in_dir(dir: impl Into<PathBuf>) -> Result<Self, AuthError> {
        let dir = dir.into();

        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }

        Ok(Self {
            session_path: dir.join("session.json"),
            profile_path: dir.join("user.json"),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    fn get_data_dir() -> Result<PathBuf, AuthError> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| AuthError::Configuration("Could not find cache directory".to_string()))?
            .join("storefront");
        Ok(cache_dir)
    }

    async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, AuthError> {
        match tokio::fs::read_to_string(path).await {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AuthError::SessionStore(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), AuthError> {
        let _guard = self.write_lock.lock().await;
        Self::replace_file(path, value).await
    }

    /// Caller must hold `write_lock`.
    async fn replace_file<T: Serialize>(path: &Path, value: &T) -> Result<(), AuthError> {
        let json = serde_json::to_string_pretty(value)?;
        let tmp_path = path.with_extension("json.tmp");

        tokio::fs::write(&tmp_path, json)
            .await
            .map_err(|e| AuthError::SessionStore(format!("Failed to write session: {}", e)))?;

        // Set permissions to 0600 (read/write for owner only)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| {
                    AuthError::SessionStore(format!("Failed to set file permissions: {}", e))
                })?;
        }

        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(|e| AuthError::SessionStore(format!("Failed to replace session: {}", e)))
    }

    async fn remove(&self, path: &Path) -> Result<(), AuthError> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AuthError::SessionStore(format!(
                "Failed to delete {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn get_tokens(&self) -> Result<Option<Session>, AuthError> {
        Self::read_json(&self.session_path).await
    }

    async fn save_tokens(&self, session: &Session) -> Result<(), AuthError> {
        self.write_json(&self.session_path, session).await
    }

    async fn clear_tokens(&self) -> Result<(), AuthError> {
        self.remove(&self.session_path).await
    }

    async fn save_tokens_if(
        &self,
        session: &Session,
        still_current: &(dyn Fn() -> bool + Send + Sync),
    ) -> Result<bool, AuthError> {
        let _guard = self.write_lock.lock().await;
        if !still_current() {
            return Ok(false);
        }
        Self::replace_file(&self.session_path, session).await?;
        Ok(true)
    }

    async fn get_profile(&self) -> Result<Option<UserProfile>, AuthError> {
        Self::read_json(&self.profile_path).await
    }

    async fn save_profile(&self, profile: &UserProfile) -> Result<(), AuthError> {
        self.write_json(&self.profile_path, profile).await
    }

    async fn clear_profile(&self) -> Result<(), AuthError> {
        self.remove(&self.profile_path).await
    }
}

/// In-process store, used by tests and hosts that do not persist sessions.
#[derive(Default)]
pub struct MemorySessionStore {
    tokens: Mutex<Option<Session>>,
    profile: Mutex<Option<UserProfile>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session, profile: Option<UserProfile>) -> Self {
        Self {
            tokens: Mutex::new(Some(session)),
            profile: Mutex::new(profile),
        }
    }

    fn tokens(&self) -> std::sync::MutexGuard<'_, Option<Session>> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn profile(&self) -> std::sync::MutexGuard<'_, Option<UserProfile>> {
        self.profile.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get_tokens(&self) -> Result<Option<Session>, AuthError> {
        Ok(self.tokens().clone())
    }

    async fn save_tokens(&self, session: &Session) -> Result<(), AuthError> {
        *self.tokens() = Some(session.clone());
        Ok(())
    }

    async fn clear_tokens(&self) -> Result<(), AuthError> {
        *self.tokens() = None;
        Ok(())
    }

    async fn save_tokens_if(
        &self,
        session: &Session,
        still_current: &(dyn Fn() -> bool + Send + Sync),
    ) -> Result<bool, AuthError> {
        let mut tokens = self.tokens();
        if !still_current() {
            return Ok(false);
        }
        *tokens = Some(session.clone());
        Ok(true)
    }

    async fn get_profile(&self) -> Result<Option<UserProfile>, AuthError> {
        Ok(self.profile().clone())
    }

    async fn save_profile(&self, profile: &UserProfile) -> Result<(), AuthError> {
        *self.profile() = Some(profile.clone());
        Ok(())
    }

    async fn clear_profile(&self) -> Result<(), AuthError> {
        *self.profile() = None;
        Ok(())
    }
}
