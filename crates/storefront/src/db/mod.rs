//! Data access for the storefront.
//!
//! # Tiers
//!
//! - **Primary**: `PostgreSQL` ([`PgPrimaryStore`]), the system of record. When
//!   no database is configured, [`OfflineStore`] stands in and every call runs
//!   in degraded mode.
//! - **Volatile**: [`VolatileStore`], an in-process fallback used only while
//!   the primary is unreachable.
//!
//! Handlers never talk to a tier directly; they go through [`Repository`].
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p marketstall-cli -- migrate
//! ```

pub mod merge;
pub mod offline;
pub mod postgres;
pub mod repository;
pub mod store;
pub mod volatile;

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use offline::OfflineStore;
pub use postgres::PgPrimaryStore;
pub use repository::{Entity, Fetched, Repository};
pub use store::{Document, Filter, Kind, PrimaryStore, StoreError};
pub use volatile::{PendingWrite, VolatileStore, WriteOp};

/// Errors surfaced by the [`Repository`].
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// No such record in the tier that answered.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., an email already registered).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// Both the primary and the volatile store failed.
    #[error("{kind} {operation} failed on both tiers (primary: {primary}; fallback: {fallback})")]
    Unavailable {
        kind: Kind,
        operation: &'static str,
        primary: String,
        fallback: String,
    },

    /// A write would leave the record structurally invalid. Nothing was stored.
    #[error("invalid record: {0}")]
    Invalid(String),

    /// A stored record could not be decoded.
    #[error("data corruption: {0}")]
    DataCorruption(String),
}

/// Create a lazily connecting `PostgreSQL` pool.
///
/// No connection is attempted until first use, so the process starts while
/// the database is down and recovers on its own once it comes back. Acquire
/// and statement latency are bounded by the pool's acquire timeout.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection string cannot be parsed.
pub fn create_pool(database_url: &SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(0)
        .acquire_timeout(Duration::from_secs(5))
        .connect_lazy(database_url.expose_secret())
}
