//! Integration test harness for Marketstall.
//!
//! Tests drive the real axum router in process with
//! `tower::ServiceExt::oneshot`. The primary store is a [`FlakyPrimary`]
//! that can be switched off to exercise degraded mode and that counts every
//! call it receives.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p marketstall-integration-tests
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use marketstall_core::{Email, Role, UserId};
use marketstall_storefront::clock::{Clock, ManualClock};
use marketstall_storefront::config::StorefrontConfig;
use marketstall_storefront::db::{Document, Filter, Kind, PrimaryStore, StoreError, VolatileStore};
use marketstall_storefront::models::SessionClaims;
use marketstall_storefront::routes;
use marketstall_storefront::session::{CookieChannel, SESSION_COOKIE_NAME};
use marketstall_storefront::state::AppState;

/// Signing secret used by every test app.
pub const TEST_SECRET: &str = "it-9Vq3LmX7rT2wZ8kP4nB6yH1cJ5dF0gS";

/// In-memory primary store that can be taken offline.
pub struct FlakyPrimary {
    backing: VolatileStore,
    up: AtomicBool,
    calls: AtomicUsize,
}

impl FlakyPrimary {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            backing: VolatileStore::new(usize::MAX, clock),
            up: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        }
    }

    /// Bring the store up or take it down.
    pub fn set_up(&self, up: bool) {
        self.up.store(up, Ordering::SeqCst);
    }

    /// Number of calls received, successful or not.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Records of `kind` currently held, bypassing the call counter.
    #[must_use]
    pub fn stored(&self, kind: Kind) -> usize {
        self.backing.len(kind)
    }

    /// Write straight into the store, bypassing the call counter and the up flag.
    ///
    /// # Panics
    ///
    /// Panics if the record cannot be stored.
    pub fn seed(&self, kind: Kind, id: Uuid, document: Document) {
        self.backing
            .create(kind, id, document)
            .unwrap_or_else(|e| panic!("seed failed: {e}"));
    }

    fn check(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.up.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("connection refused".to_owned()))
        }
    }
}

#[async_trait]
impl PrimaryStore for FlakyPrimary {
    async fn get(&self, kind: Kind, id: Uuid) -> Result<Option<Document>, StoreError> {
        self.check()?;
        self.backing.get(kind, id)
    }

    async fn list(&self, kind: Kind, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        self.check()?;
        self.backing.list(kind, filter)
    }

    async fn create(&self, kind: Kind, id: Uuid, document: Document) -> Result<Document, StoreError> {
        self.check()?;
        self.backing.create(kind, id, document)
    }

    async fn update(
        &self,
        kind: Kind,
        id: Uuid,
        patch: Document,
    ) -> Result<Option<Document>, StoreError> {
        self.check()?;
        self.backing.update(kind, id, &patch)
    }

    async fn delete(&self, kind: Kind, id: Uuid) -> Result<bool, StoreError> {
        self.check()?;
        self.backing.delete(kind, id)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check()
    }
}

/// A response reduced to what tests inspect.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    /// Value of the session cookie set by this response, if it set a live one.
    #[must_use]
    pub fn session_cookie(&self) -> Option<String> {
        self.set_cookies().into_iter().find_map(|c| {
            let value = c
                .split(';')
                .next()?
                .strip_prefix(SESSION_COOKIE_NAME)?
                .strip_prefix('=')?;
            (!value.is_empty()).then(|| format!("{SESSION_COOKIE_NAME}={value}"))
        })
    }

    /// Every `Set-Cookie` header, in order.
    #[must_use]
    pub fn set_cookies(&self) -> Vec<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok().map(str::to_owned))
            .collect()
    }
}

/// A storefront instance with its own stores, cache and clock.
pub struct TestApp {
    pub state: AppState,
    pub primary: Arc<FlakyPrimary>,
    pub clock: Arc<ManualClock>,
}

impl TestApp {
    /// App with the default volatile capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_vars(&[])
    }

    /// App with extra configuration variables.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid.
    #[must_use]
    pub fn with_vars(vars: &[(&str, &str)]) -> Self {
        let mut env: HashMap<String, String> = HashMap::from([(
            "MARKETSTALL_SESSION_SECRET".to_owned(),
            TEST_SECRET.to_owned(),
        )]);
        env.extend(vars.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())));
        let config = StorefrontConfig::from_lookup(|key| env.get(key).cloned())
            .unwrap_or_else(|e| panic!("test config rejected: {e}"));

        let clock = Arc::new(ManualClock::new(
            DateTime::<Utc>::UNIX_EPOCH + TimeDelta::days(20_000),
        ));
        let shared: Arc<dyn Clock> = clock.clone();
        let primary = Arc::new(FlakyPrimary::new(Arc::clone(&shared)));
        let state = AppState::with_primary(config, primary.clone(), shared);

        Self {
            state,
            primary,
            clock,
        }
    }

    #[must_use]
    pub fn router(&self) -> Router {
        routes::app(self.state.clone())
    }

    /// Send one request through the router.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be built or the body cannot be read.
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(json) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap_or_else(|e| panic!("bad request: {e}"));

        let response = self
            .router()
            .oneshot(request)
            .await
            .unwrap_or_else(|e| match e {});
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap_or_else(|e| panic!("unreadable body: {e}"));
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// Session cookie for a user that exists only in the token.
    ///
    /// # Panics
    ///
    /// Panics if the token cannot be issued.
    #[must_use]
    pub fn cookie_for(&self, role: Role) -> String {
        let claims = SessionClaims {
            subject: UserId::generate(),
            email: Email::parse("staff@example.com").unwrap_or_else(|e| panic!("{e}")),
            name: "Staff".to_owned(),
            role,
        };
        let mut channel = CookieChannel::default();
        let token = self
            .state
            .sessions()
            .issue(&mut channel, &claims)
            .unwrap_or_else(|e| panic!("cannot issue token: {e}"));
        format!("{SESSION_COOKIE_NAME}={token}")
    }

    /// Register a user over HTTP and return their session cookie.
    ///
    /// # Panics
    ///
    /// Panics if registration does not succeed.
    pub async fn register(&self, email: &str, name: &str) -> String {
        let response = self
            .send(
                Method::POST,
                "/auth/register",
                None,
                Some(serde_json::json!({
                    "email": email,
                    "name": name,
                    "password": "correct horse battery",
                })),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        response
            .session_cookie()
            .unwrap_or_else(|| panic!("registration set no session cookie"))
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}
