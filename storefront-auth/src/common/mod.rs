mod models;

pub use models::{Session, UserProfile};
