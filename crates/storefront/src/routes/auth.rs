//! Authentication route handlers.
//!
//! Password registration and login issue a signed session cookie; logout
//! clears it on every path it may have been scoped to.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::db::Fetched;
use crate::error::{AppError, Result, add_breadcrumb, clear_sentry_user, set_sentry_user};
use crate::middleware::RequireSession;
use crate::models::{CartItem, User, UserProfile};
use crate::services::auth::AuthService;
use crate::session::CookieChannel;
use crate::state::AppState;

// =============================================================================
// Request Types
// =============================================================================

/// Registration request body.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub password: String,
}

/// Login request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    /// Lines collected while signed out, merged into the user's cart.
    #[serde(default)]
    pub cart: Vec<CartItem>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Create an account and sign it in.
#[instrument(skip(state, channel, form), fields(email = %form.email))]
pub async fn register(
    State(state): State<AppState>,
    mut channel: CookieChannel,
    Json(form): Json<RegisterRequest>,
) -> Result<impl IntoResponse> {
    let auth = AuthService::new(state.repo(), state.clock());
    let created = auth.register(&form.email, &form.name, &form.password).await?;

    state.sessions().issue(&mut channel, &created.value.claims())?;
    set_sentry_user(&created.value.id, Some(created.value.email.as_str()));

    Ok((StatusCode::CREATED, channel, Json(profile(&created))))
}

/// Sign in with email and password.
#[instrument(skip(state, channel, form), fields(email = %form.email))]
pub async fn login(
    State(state): State<AppState>,
    mut channel: CookieChannel,
    Json(form): Json<LoginRequest>,
) -> Result<impl IntoResponse> {
    let auth = AuthService::new(state.repo(), state.clock());
    let user = auth.login(&form.email, &form.password).await?;

    if !form.cart.is_empty() {
        let lines = form.cart.len().to_string();
        // A failed merge must not block sign-in.
        match state.repo().merge_cart(user.value.id, form.cart).await {
            Ok(_) => add_breadcrumb("cart", "Merged guest cart", Some(&[("lines", lines.as_str())])),
            Err(e) => warn!(user_id = %user.value.id, error = %e, "Guest cart merge failed"),
        }
    }

    state.sessions().issue(&mut channel, &user.value.claims())?;
    set_sentry_user(&user.value.id, Some(user.value.email.as_str()));
    info!(user_id = %user.value.id, "User logged in");

    Ok((channel, Json(profile(&user))))
}

/// Clear the session cookie.
pub async fn logout(State(state): State<AppState>, mut channel: CookieChannel) -> impl IntoResponse {
    state.sessions().revoke(&mut channel);
    clear_sentry_user();
    (channel, StatusCode::NO_CONTENT)
}

/// Profile of the signed-in user.
pub async fn me(
    State(state): State<AppState>,
    RequireSession(claims): RequireSession,
) -> Result<Json<Fetched<UserProfile>>> {
    let found = state.repo().get::<User>(claims.subject.as_uuid()).await?;
    let from_primary = found.from_primary;
    let user = found
        .value
        .ok_or_else(|| AppError::NotFound("User not found".to_owned()))?;
    Ok(Json(Fetched {
        value: UserProfile::from(&user),
        from_primary,
    }))
}

fn profile(user: &Fetched<User>) -> Fetched<UserProfile> {
    Fetched {
        value: UserProfile::from(&user.value),
        from_primary: user.from_primary,
    }
}
