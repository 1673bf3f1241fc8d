//! Session token commands.
//!
//! # Usage
//!
//! ```bash
//! # Mint a token for the first admin
//! ms-cli token issue -e admin@example.com -n "Admin Name" -r admin
//!
//! # Check a token from a browser cookie
//! ms-cli token inspect <token>
//! ```
//!
//! Both use `MARKETSTALL_SESSION_SECRET` the same way the server does.

use std::sync::Arc;

use marketstall_core::{Email, EmailError, Role, RoleParseError, UserId};
use marketstall_storefront::clock::{Clock, SystemClock};
use marketstall_storefront::config::{ConfigError, StorefrontConfig};
use marketstall_storefront::models::SessionClaims;
use marketstall_storefront::session::{CookieChannel, SessionManager, TokenCodec, TokenError};
use thiserror::Error;

/// Errors that can occur during token operations.
#[derive(Debug, Error)]
pub enum TokenCommandError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    #[error("Invalid role: {0}. Valid roles: user, admin")]
    InvalidRole(#[from] RoleParseError),

    #[error("Invalid subject: {0}")]
    InvalidSubject(String),

    #[error("Token rejected: {0}")]
    Rejected(#[from] TokenError),

    #[error("Failed to render claims: {0}")]
    Render(#[from] serde_json::Error),
}

/// Mint a session token and print it.
///
/// # Errors
///
/// Returns an error if the configuration, email, role or subject is invalid.
pub fn issue(
    subject: Option<&str>,
    email: &str,
    name: &str,
    role: &str,
) -> Result<(), TokenCommandError> {
    let config = StorefrontConfig::from_env()?;
    let subject = match subject {
        Some(raw) => raw
            .parse::<UserId>()
            .map_err(|e| TokenCommandError::InvalidSubject(e.to_string()))?,
        None => UserId::generate(),
    };
    let claims = SessionClaims {
        subject,
        email: Email::parse(&marketstall_core::email::normalize(email))?,
        name: name.trim().to_owned(),
        role: role.parse::<Role>()?,
    };

    let sessions = SessionManager::new(
        TokenCodec::new(config.session_secret),
        Arc::new(SystemClock),
        false,
    );
    let token = sessions.issue(&mut CookieChannel::default(), &claims)?;

    tracing::info!(user_id = %claims.subject, role = %claims.role, "Token issued");
    #[allow(clippy::print_stdout)]
    {
        println!("{token}");
    }
    Ok(())
}

/// Verify a token and print its claims.
///
/// # Errors
///
/// Returns the rejection reason if the token is malformed, forged or expired.
pub fn inspect(token: &str) -> Result<(), TokenCommandError> {
    let config = StorefrontConfig::from_env()?;
    let codec = TokenCodec::new(config.session_secret);
    let claims = codec.decode(token.trim(), SystemClock.now())?;

    #[allow(clippy::print_stdout)]
    {
        println!("{}", serde_json::to_string_pretty(&claims)?);
    }
    Ok(())
}
