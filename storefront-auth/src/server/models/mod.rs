mod api;
mod token;

pub use api::*;
pub use token::{IssuedToken, TokenKind};
