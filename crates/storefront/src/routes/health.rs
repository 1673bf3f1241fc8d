//! Liveness and readiness probes.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use tracing::warn;

use crate::state::AppState;

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
pub async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
pub struct Readiness {
    pub primary: bool,
    /// Writes held only by the volatile store.
    pub pending_reconciliation: usize,
}

/// Readiness health check endpoint.
///
/// Returns 503 while the primary store is unreachable. The service still
/// answers requests in that state, from the volatile store.
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<Readiness>) {
    let primary = match state.repo().ping_primary().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Primary store not ready");
            false
        }
    };
    let status = if primary {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(Readiness {
            primary,
            pending_reconciliation: state.repo().pending_reconciliation().len(),
        }),
    )
}
