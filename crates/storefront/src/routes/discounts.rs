//! Discount code lookup.

use axum::{
    Json,
    extract::{Path, State},
};

use crate::db::{Fetched, Filter};
use crate::error::{AppError, Result};
use crate::models::Discount;
use crate::models::catalog::normalize_code;
use crate::state::AppState;

/// Look up an active discount by code, case-insensitively.
pub async fn show(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Fetched<Discount>>> {
    let found = state
        .repo()
        .find_one::<Discount>(Filter::eq("code", normalize_code(&code)))
        .await?;
    let from_primary = found.from_primary;
    let discount = found
        .value
        .filter(|d| d.active)
        .ok_or_else(|| AppError::NotFound("Unknown discount code".to_owned()))?;
    Ok(Json(Fetched {
        value: discount,
        from_primary,
    }))
}
