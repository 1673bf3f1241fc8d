//! Application state shared across handlers.
//!
//! This is the composition root: every shared structure (repository tiers,
//! session manager, cache, clock) is built here and handed out by reference.
//! Tests build isolated instances with [`AppState::with_primary`].

use std::sync::Arc;

use axum::extract::FromRef;
use serde_json::Value;
use tracing::{info, warn};

use crate::cache::TtlCache;
use crate::clock::{Clock, SystemClock};
use crate::config::StorefrontConfig;
use crate::db::{self, OfflineStore, PgPrimaryStore, PrimaryStore, Repository, VolatileStore};
use crate::session::{SessionManager, TokenCodec};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    repo: Repository,
    sessions: SessionManager,
    cache: TtlCache<Value>,
    clock: Arc<dyn Clock>,
}

impl AppState {
    /// Create application state from configuration.
    ///
    /// With a database URL the primary store is `PostgreSQL` on a lazily
    /// connecting pool; without one, every call runs in degraded mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the database URL cannot be parsed.
    pub fn new(config: StorefrontConfig) -> Result<Self, sqlx::Error> {
        let primary: Arc<dyn PrimaryStore> = match &config.database_url {
            Some(url) => {
                info!("Using PostgreSQL primary store");
                Arc::new(PgPrimaryStore::new(db::create_pool(url)?))
            }
            None => {
                warn!("No database configured, running on the volatile store only");
                Arc::new(OfflineStore)
            }
        };
        Ok(Self::with_primary(config, primary, Arc::new(SystemClock)))
    }

    /// Create application state over an explicit primary store and clock.
    #[must_use]
    pub fn with_primary(
        config: StorefrontConfig,
        primary: Arc<dyn PrimaryStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let volatile = Arc::new(VolatileStore::new(
            config.fallback_capacity,
            Arc::clone(&clock),
        ));
        let repo = Repository::new(primary, volatile, Arc::clone(&clock));
        let sessions = SessionManager::new(
            TokenCodec::new(config.session_secret.clone()),
            Arc::clone(&clock),
            config.secure_cookies(),
        );

        Self {
            inner: Arc::new(AppStateInner {
                config,
                repo,
                sessions,
                cache: TtlCache::new(),
                clock,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the fallback repository.
    #[must_use]
    pub fn repo(&self) -> &Repository {
        &self.inner.repo
    }

    /// Get a reference to the session manager.
    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.inner.sessions
    }

    /// Get a reference to the response cache.
    #[must_use]
    pub fn cache(&self) -> &TtlCache<Value> {
        &self.inner.cache
    }

    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.inner.clock.as_ref()
    }
}

impl FromRef<AppState> for SessionManager {
    fn from_ref(state: &AppState) -> Self {
        state.sessions().clone()
    }
}
