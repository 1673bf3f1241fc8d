//! Product and review route handlers.
//!
//! The active catalog and each product's review summary are aggregates
//! served through the TTL cache; writes elsewhere invalidate them.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, instrument};

use marketstall_core::{ProductId, ReviewId};

use super::{PRODUCTS_CACHE_KEY, cached, review_summary_key};
use crate::db::{Fetched, Filter};
use crate::error::{AppError, Result};
use crate::middleware::RequireSession;
use crate::models::review::RATING_RANGE;
use crate::models::{Product, Review, ReviewSummary};
use crate::state::AppState;

/// Longest accepted review comment, in characters.
const MAX_COMMENT_LENGTH: usize = 2000;

/// Review submission body.
#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub rating: u8,
    #[serde(default)]
    pub comment: String,
}

/// Active products (cached).
pub async fn index(State(state): State<AppState>) -> Result<Json<Value>> {
    let repo = state.repo();
    cached(&state, PRODUCTS_CACHE_KEY, move || async move {
        repo.list::<Product>(Filter::eq("active", true))
            .await
            .map_err(AppError::from)
    })
    .await
}

/// A single active product.
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<Fetched<Product>>> {
    Ok(Json(active_product(&state, id).await?))
}

/// Reviews of a product, oldest first.
pub async fn reviews(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<Fetched<Vec<Review>>>> {
    Ok(Json(product_reviews(&state, id).await?))
}

/// Rating summary of a product (cached).
pub async fn review_summary(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<Value>> {
    let state = &state;
    cached(state, &review_summary_key(id), move || async move {
        product_reviews(state, id)
            .await
            .map(|fetched| fetched.map(|reviews| ReviewSummary::from_reviews(&reviews)))
    })
    .await
}

/// Review a product as the signed-in user.
#[instrument(skip(state, claims, form), fields(user_id = %claims.subject))]
pub async fn create_review(
    State(state): State<AppState>,
    RequireSession(claims): RequireSession,
    Path(id): Path<ProductId>,
    Json(form): Json<ReviewRequest>,
) -> Result<impl IntoResponse> {
    if !RATING_RANGE.contains(&form.rating) {
        return Err(AppError::Malformed(format!(
            "rating must be between {} and {}",
            RATING_RANGE.start(),
            RATING_RANGE.end()
        )));
    }
    let comment = form.comment.trim();
    if comment.chars().count() > MAX_COMMENT_LENGTH {
        return Err(AppError::Malformed(format!(
            "comment must be at most {MAX_COMMENT_LENGTH} characters"
        )));
    }

    active_product(&state, id).await?;

    let now = state.clock().now();
    let review = Review {
        id: ReviewId::generate(),
        product_id: id,
        user_id: claims.subject,
        author_name: claims.name,
        rating: form.rating,
        comment: comment.to_owned(),
        created_at: now,
        updated_at: now,
    };
    let created = state.repo().create(&review).await?;
    state.cache().delete(&review_summary_key(id)).await;
    info!(review_id = %review.id, product_id = %id, "Review created");

    Ok((StatusCode::CREATED, Json(created)))
}

async fn active_product(state: &AppState, id: ProductId) -> Result<Fetched<Product>> {
    let found = state.repo().get::<Product>(id.as_uuid()).await?;
    let from_primary = found.from_primary;
    let product = found
        .value
        .filter(|p| p.active)
        .ok_or_else(|| AppError::NotFound(format!("Product {id} not found")))?;
    Ok(Fetched {
        value: product,
        from_primary,
    })
}

async fn product_reviews(state: &AppState, id: ProductId) -> Result<Fetched<Vec<Review>>> {
    let mut reviews = state
        .repo()
        .list::<Review>(Filter::eq("product_id", id.to_string()))
        .await?;
    reviews.value.sort_by_key(|r| r.created_at);
    Ok(reviews)
}
