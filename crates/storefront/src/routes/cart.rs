//! Cart route handlers.
//!
//! Carts belong to the signed-in user. Adding lines merges them into the
//! stored cart: matching lines sum their quantities, new lines are appended.

use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::instrument;

use crate::db::Fetched;
use crate::error::{AppError, Result};
use crate::middleware::RequireSession;
use crate::models::{Cart, CartItem};
use crate::state::AppState;

/// Lines to add to the cart.
#[derive(Debug, Deserialize)]
pub struct AddItemsRequest {
    pub items: Vec<CartItem>,
}

/// The signed-in user's cart, empty if none has been stored yet.
pub async fn show(
    State(state): State<AppState>,
    RequireSession(claims): RequireSession,
) -> Result<Json<Fetched<Cart>>> {
    let found = state.repo().cart_for(claims.subject).await?;
    let now = state.clock().now();
    Ok(Json(
        found.map(|cart| cart.unwrap_or_else(|| Cart::empty(claims.subject, now))),
    ))
}

/// Merge lines into the cart.
#[instrument(skip(state, claims, form), fields(user_id = %claims.subject, lines = form.items.len()))]
pub async fn add_items(
    State(state): State<AppState>,
    RequireSession(claims): RequireSession,
    Json(form): Json<AddItemsRequest>,
) -> Result<Json<Fetched<Cart>>> {
    if form.items.is_empty() {
        return Err(AppError::Malformed("no items to add".to_owned()));
    }
    if form.items.iter().any(|item| item.quantity == Some(0)) {
        return Err(AppError::Malformed("quantity must be at least 1".to_owned()));
    }
    Ok(Json(state.repo().merge_cart(claims.subject, form.items).await?))
}

/// Remove every line from the cart.
pub async fn clear(
    State(state): State<AppState>,
    RequireSession(claims): RequireSession,
) -> Result<Json<Fetched<Cart>>> {
    let found = state.repo().cart_for(claims.subject).await?;
    let Some(cart) = found.value else {
        let now = state.clock().now();
        return Ok(Json(Fetched {
            value: Cart::empty(claims.subject, now),
            from_primary: found.from_primary,
        }));
    };

    let mut patch = Map::new();
    patch.insert("items".to_owned(), Value::Array(Vec::new()));
    Ok(Json(state.repo().update::<Cart>(cart.id.as_uuid(), patch).await?))
}
