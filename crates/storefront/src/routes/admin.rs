//! Admin console API.
//!
//! Every handler takes [`RequireAdmin`] first, so an unauthorized call is
//! rejected before its body is parsed or any store is touched.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{info, instrument};

use marketstall_core::{DiscountId, Price, ProductId, Role, UserId};

use super::{PRODUCTS_CACHE_KEY, review_summary_key};
use crate::cache::CacheStats;
use crate::db::{Entity, Fetched, Filter, PendingWrite};
use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::models::catalog::normalize_code;
use crate::models::{Discount, Order, Product, User, UserProfile};
use crate::state::AppState;

// =============================================================================
// Request Types
// =============================================================================

/// New product body.
#[derive(Debug, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Price,
    #[serde(default)]
    pub stock: u32,
    #[serde(default = "default_true")]
    pub active: bool,
}

/// New discount body.
#[derive(Debug, Deserialize)]
pub struct NewDiscount {
    pub code: String,
    pub percent_off: u8,
    #[serde(default = "default_true")]
    pub active: bool,
}

/// Role change body.
#[derive(Debug, Deserialize)]
pub struct RoleChange {
    pub role: Role,
}

const fn default_true() -> bool {
    true
}

// =============================================================================
// Products
// =============================================================================

/// Every product, including inactive ones.
pub async fn list_products(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
) -> Result<Json<Fetched<Vec<Product>>>> {
    Ok(Json(state.repo().list::<Product>(Filter::All).await?))
}

#[instrument(skip(state, admin, form), fields(admin_id = %admin.subject))]
pub async fn create_product(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(form): Json<NewProduct>,
) -> Result<impl IntoResponse> {
    let product = Product {
        id: ProductId::generate(),
        name: form.name.trim().to_owned(),
        description: form.description,
        price: form.price,
        stock: form.stock,
        active: form.active,
        updated_at: state.clock().now(),
    };
    product.validate().map_err(AppError::Malformed)?;
    let created = state.repo().create(&product).await?;
    state.cache().delete(PRODUCTS_CACHE_KEY).await;
    info!(product_id = %product.id, "Product created");

    Ok((StatusCode::CREATED, Json(created)))
}

/// Shallow-patch a product.
pub async fn update_product(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<ProductId>,
    Json(patch): Json<Map<String, Value>>,
) -> Result<Json<Fetched<Product>>> {
    let updated = state.repo().update::<Product>(id.as_uuid(), patch).await?;
    state.cache().delete(PRODUCTS_CACHE_KEY).await;
    Ok(Json(updated))
}

pub async fn delete_product(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<ProductId>,
) -> Result<StatusCode> {
    state.repo().delete::<Product>(id.as_uuid()).await?;
    state.cache().delete(PRODUCTS_CACHE_KEY).await;
    state.cache().delete(&review_summary_key(id)).await;
    info!(product_id = %id, "Product deleted");
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Discounts
// =============================================================================

pub async fn list_discounts(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
) -> Result<Json<Fetched<Vec<Discount>>>> {
    Ok(Json(state.repo().list::<Discount>(Filter::All).await?))
}

pub async fn create_discount(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Json(form): Json<NewDiscount>,
) -> Result<impl IntoResponse> {
    let code = normalize_code(&form.code);
    let discount = Discount {
        id: DiscountId::generate(),
        code,
        percent_off: form.percent_off,
        active: form.active,
        updated_at: state.clock().now(),
    };
    discount.validate().map_err(AppError::Malformed)?;

    let exists = state
        .repo()
        .find_one::<Discount>(Filter::eq("code", discount.code.as_str()))
        .await?;
    if exists.value.is_some() {
        return Err(AppError::Conflict(format!(
            "discount code {} already exists",
            discount.code
        )));
    }

    let created = state.repo().create(&discount).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn delete_discount(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<DiscountId>,
) -> Result<StatusCode> {
    state.repo().delete::<Discount>(id.as_uuid()).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Users and orders
// =============================================================================

pub async fn list_users(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
) -> Result<Json<Fetched<Vec<UserProfile>>>> {
    let users = state.repo().list::<User>(Filter::All).await?;
    Ok(Json(users.map(|users| users.iter().map(UserProfile::from).collect())))
}

/// Change a user's role. Takes effect at that user's next sign-in.
#[instrument(skip(state, admin, form), fields(admin_id = %admin.subject))]
pub async fn set_user_role(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<UserId>,
    Json(form): Json<RoleChange>,
) -> Result<Json<Fetched<UserProfile>>> {
    let mut patch = Map::new();
    patch.insert("role".to_owned(), Value::from(form.role.as_str()));
    let updated = state.repo().update::<User>(id.as_uuid(), patch).await?;
    info!(user_id = %id, role = %form.role, "User role changed");
    Ok(Json(updated.map(|user| UserProfile::from(&user))))
}

pub async fn list_orders(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
) -> Result<Json<Fetched<Vec<Order>>>> {
    Ok(Json(state.repo().list::<Order>(Filter::All).await?))
}

// =============================================================================
// Cache and fallback store
// =============================================================================

pub async fn cache_stats(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
) -> Json<CacheStats> {
    Json(state.cache().stats().await)
}

pub async fn clear_cache(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> StatusCode {
    state.cache().clear().await;
    info!(admin_id = %admin.subject, "Cache cleared");
    StatusCode::NO_CONTENT
}

pub async fn delete_cache_key(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(key): Path<String>,
) -> StatusCode {
    state.cache().delete(&key).await;
    StatusCode::NO_CONTENT
}

/// Writes that exist only in the volatile store.
pub async fn pending_writes(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
) -> Json<Vec<PendingWrite>> {
    Json(state.repo().pending_reconciliation())
}
