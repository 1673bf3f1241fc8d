//! HTTP middleware and extractors for storefront.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (capture errors, added in `main`)
//! 2. `TraceLayer` (request span)
//! 3. Request ID (recorded into the span)
//!
//! Authorization is not a layer: handlers take [`RequireSession`] or
//! [`RequireAdmin`] and are refused during extraction.

pub mod auth;
pub mod request_id;

pub use auth::{CurrentSession, RequireAdmin, RequireSession};
pub use request_id::{REQUEST_ID_HEADER, RequestId, request_id_middleware};
