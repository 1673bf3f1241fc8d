//! HTTP route handlers for storefront.
//!
//! Every data response is the envelope `{ "data": ..., "primary": bool }`,
//! where `primary` is false when the answer came from the volatile store.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Liveness
//! GET  /health/ready           - Primary store reachability
//!
//! # Auth
//! POST /auth/register          - Create account and sign in
//! POST /auth/login             - Sign in (optionally merging a guest cart)
//! POST /auth/logout            - Clear the session cookie
//! GET  /auth/me                - Current user profile
//!
//! # Catalog
//! GET  /products                       - Active products (cached)
//! GET  /products/{id}                  - Product detail
//! GET  /products/{id}/reviews          - Reviews
//! POST /products/{id}/reviews          - Write a review (session)
//! GET  /products/{id}/reviews/summary  - Rating summary (cached)
//! GET  /discounts/{code}               - Discount lookup
//!
//! # Cart and orders (session)
//! GET    /cart                 - Current cart
//! POST   /cart/items           - Merge lines into the cart
//! DELETE /cart                 - Empty the cart
//! GET    /orders               - Order history
//! POST   /orders               - Checkout
//!
//! # Admin (admin session)
//! GET    /admin/products               POST /admin/products
//! PATCH  /admin/products/{id}          DELETE /admin/products/{id}
//! GET    /admin/discounts              POST /admin/discounts
//! DELETE /admin/discounts/{id}
//! GET    /admin/users                  PUT /admin/users/{id}/role
//! GET    /admin/orders
//! GET    /admin/cache                  DELETE /admin/cache
//! DELETE /admin/cache/{key}
//! GET    /admin/fallback/pending
//! ```

pub mod admin;
pub mod auth;
pub mod cart;
pub mod discounts;
pub mod health;
pub mod orders;
pub mod products;

use std::future::Future;

use axum::{
    Json, Router,
    body::Body,
    http::Request,
    middleware::from_fn,
    routing::{delete, get, patch, post, put},
};
use serde::Serialize;
use serde_json::Value;
use tower_http::trace::TraceLayer;
use tracing::debug;

use marketstall_core::ProductId;

use crate::db::Fetched;
use crate::error::{AppError, Result};
use crate::middleware::request_id_middleware;
use crate::state::AppState;

/// Cache key of the active product list.
pub const PRODUCTS_CACHE_KEY: &str = "products:active";

/// Cache key of a product's review summary.
#[must_use]
pub fn review_summary_key(product_id: ProductId) -> String {
    format!("reviews:summary:{product_id}")
}

/// Serve `key` from the cache, or compute, cache and serve it.
///
/// Only answers from the primary store are cached, so a degraded answer is
/// never pinned for a full TTL. If any key is invalidated while `load` runs,
/// the result is served but not cached.
pub(crate) async fn cached<T, F, Fut>(state: &AppState, key: &str, load: F) -> Result<Json<Value>>
where
    T: Serialize,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Fetched<T>>>,
{
    if let Some(hit) = state.cache().get(key).await {
        debug!(key, "Cache hit");
        return Ok(Json(hit));
    }

    let seen = state.cache().generation().await;
    let fetched = load().await?;
    let body = serde_json::to_value(&fetched).map_err(|e| AppError::Internal(e.to_string()))?;
    if fetched.from_primary {
        state
            .cache()
            .set_if_unchanged(key, body.clone(), state.config().cache_ttl, seen)
            .await;
    }
    Ok(Json(body))
}

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
}

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index))
        .route("/{id}", get(products::show))
        .route(
            "/{id}/reviews",
            get(products::reviews).post(products::create_review),
        )
        .route("/{id}/reviews/summary", get(products::review_summary))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).delete(cart::clear))
        .route("/items", post(cart::add_items))
}

/// Create the admin routes router.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/products",
            get(admin::list_products).post(admin::create_product),
        )
        .route(
            "/products/{id}",
            patch(admin::update_product).delete(admin::delete_product),
        )
        .route(
            "/discounts",
            get(admin::list_discounts).post(admin::create_discount),
        )
        .route("/discounts/{id}", delete(admin::delete_discount))
        .route("/users", get(admin::list_users))
        .route("/users/{id}/role", put(admin::set_user_role))
        .route("/orders", get(admin::list_orders))
        .route("/cache", get(admin::cache_stats).delete(admin::clear_cache))
        .route("/cache/{key}", delete(admin::delete_cache_key))
        .route("/fallback/pending", get(admin::pending_writes))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/auth", auth_routes())
        .nest("/products", product_routes())
        .route("/discounts/{code}", get(discounts::show))
        .nest("/cart", cart_routes())
        .route("/orders", get(orders::index).post(orders::create))
        .nest("/admin", admin_routes())
}

/// The application router with request tracing, ready to serve.
pub fn app(state: AppState) -> Router {
    routes()
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = tracing::field::Empty,
                )
            }),
        )
        .with_state(state)
}
