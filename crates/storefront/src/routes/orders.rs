//! Order route handlers.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use crate::db::{Fetched, Filter};
use crate::error::{Result, add_breadcrumb};
use crate::middleware::RequireSession;
use crate::models::Order;
use crate::services::checkout::CheckoutService;
use crate::state::AppState;

use super::PRODUCTS_CACHE_KEY;

/// Checkout request body.
#[derive(Debug, Default, Deserialize)]
pub struct PlaceOrderRequest {
    #[serde(default)]
    pub discount_code: Option<String>,
}

/// The signed-in user's orders, newest first.
pub async fn index(
    State(state): State<AppState>,
    RequireSession(claims): RequireSession,
) -> Result<Json<Fetched<Vec<Order>>>> {
    let mut orders = state
        .repo()
        .list::<Order>(Filter::eq("user_id", claims.subject.to_string()))
        .await?;
    orders.value.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Json(orders))
}

/// Check out the signed-in user's cart.
pub async fn create(
    State(state): State<AppState>,
    RequireSession(claims): RequireSession,
    Json(form): Json<PlaceOrderRequest>,
) -> Result<impl IntoResponse> {
    let checkout = CheckoutService::new(state.repo(), state.clock());
    let placed = checkout
        .place_order(claims.subject, form.discount_code.as_deref())
        .await?;

    // Stock changed.
    state.cache().delete(PRODUCTS_CACHE_KEY).await;
    let order_id = placed.value.id.to_string();
    add_breadcrumb("checkout", "Order placed", Some(&[("order_id", order_id.as_str())]));

    Ok((StatusCode::CREATED, Json(placed)))
}
