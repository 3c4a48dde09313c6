// Common types shared between client and server
pub mod common;

// Client library (public API for the storefront host)
mod client;
mod error;

pub use client::{
    connect, AuthContext, FileSessionStore, MemorySessionStore, Registration, SessionPhase,
    SessionSnapshot, SessionStore, Settings, SignOutFn, TokenRefreshCoordinator,
};
pub use common::{Session, UserProfile};
pub use error::AuthError;

// Server modules (public for binary, internal for library)
#[cfg(feature = "server")]
pub mod server;
