//! Signed, stateless sessions.

pub mod channel;
pub mod manager;
pub mod token;

pub use channel::{ClearVariant, CookieChannel, CredentialAttributes, CredentialChannel};
pub use manager::{SESSION_COOKIE_NAME, SESSION_PATHS, SessionManager};
pub use token::{TOKEN_TTL_SECONDS, TokenCodec, TokenError};
