//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::auth::AuthError;
use crate::services::checkout::CheckoutError;
use crate::session::TokenError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// No session, or the session token was rejected.
    #[error("Unauthenticated")]
    Unauthenticated,

    /// Valid session without the required capability.
    #[error("Forbidden")]
    Forbidden,

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate business key.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Input failed validation.
    #[error("Malformed: {0}")]
    Malformed(String),

    /// Both data tiers failed.
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Malformed(_) => StatusCode::BAD_REQUEST,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if matches!(self, Self::Unavailable(_) | Self::Internal(_)) {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Unauthenticated => "Sign in required".to_owned(),
            Self::Forbidden => "Not allowed".to_owned(),
            Self::Unavailable(_) => "Service temporarily unavailable".to_owned(),
            Self::Internal(_) => "Internal server error".to_owned(),
            Self::NotFound(msg) | Self::Conflict(msg) | Self::Malformed(msg) => msg.clone(),
        };

        (self.status(), Json(ErrorBody { error: &message })).into_response()
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => Self::NotFound("Not found".to_owned()),
            RepositoryError::Conflict(what) => Self::Conflict(what),
            RepositoryError::Invalid(detail) => Self::Malformed(detail),
            err @ RepositoryError::Unavailable { .. } => Self::Unavailable(err.to_string()),
            RepositoryError::DataCorruption(detail) => Self::Internal(detail),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => Self::Unauthenticated,
            AuthError::UserAlreadyExists => {
                Self::Conflict("An account with this email already exists".to_owned())
            }
            AuthError::InvalidEmail(_) => Self::Malformed("Invalid email address".to_owned()),
            AuthError::WeakPassword(msg) | AuthError::InvalidName(msg) => Self::Malformed(msg),
            AuthError::Repository(err) => err.into(),
            AuthError::PasswordHash => Self::Internal("password hashing failed".to_owned()),
        }
    }
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::Repository(err) => err.into(),
            CheckoutError::UnknownProduct(_) => Self::NotFound(err.to_string()),
            CheckoutError::InsufficientStock { .. } => Self::Conflict(err.to_string()),
            CheckoutError::EmptyCart
            | CheckoutError::LineWithoutProduct
            | CheckoutError::MixedCurrency
            | CheckoutError::PriceOverflow
            | CheckoutError::InvalidDiscount => Self::Malformed(err.to_string()),
        }
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Malformed | TokenError::SignatureMismatch | TokenError::Expired => {
                Self::Unauthenticated
            }
            TokenError::InvalidSecret | TokenError::Encode(_) => Self::Internal(err.to_string()),
        }
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Merged guest cart", Some(&[("lines", "3")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_owned()),
        message: Some(message.to_owned()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_owned(),
                serde_json::Value::String((*value).to_owned()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
