//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required in production
//! - `MARKETSTALL_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `MARKETSTALL_SESSION_SECRET` - Session signing secret (min 32 chars, high entropy)
//!
//! ## Optional
//! - `MARKETSTALL_ENV` - `development` or `production` (default: development)
//! - `MARKETSTALL_HOST` - Bind address (default: 127.0.0.1)
//! - `MARKETSTALL_PORT` - Listen port (default: 3000)
//! - `MARKETSTALL_BASE_URL` - Public URL (default: <http://localhost:3000>)
//! - `MARKETSTALL_CACHE_TTL_SECS` - Lifetime of cached aggregates (default: 300)
//! - `MARKETSTALL_CACHE_SWEEP_SECS` - Expired-entry sweep interval (default: 60)
//! - `MARKETSTALL_FALLBACK_CAPACITY` - Volatile records per kind, 0 disables (default: 10000)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment tag
//!
//! In development the database is optional (every call runs in degraded mode
//! without it) and a fixed, publicly known session secret is used when none
//! is configured.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::warn;

use crate::db::volatile::DEFAULT_CAPACITY;

const MIN_SESSION_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Signing secret used in development when none is configured. Never valid in production.
pub const INSECURE_DEVELOPMENT_SECRET: &str = "ms-dev-only-9fQ2x7LkR4vW8zT1bN6cY3hJ5mP0aD";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// Deployment environment
    pub environment: Environment,
    /// `PostgreSQL` database connection URL (contains password). `None` runs degraded.
    pub database_url: Option<SecretString>,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: String,
    /// Session signing secret
    pub session_secret: SecretString,
    /// Lifetime of cached aggregates
    pub cache_ttl: Duration,
    /// How often expired cache entries are swept
    pub cache_sweep_interval: Duration,
    /// Volatile fallback capacity per entity kind
    pub fallback_capacity: usize,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag
    pub sentry_environment: Option<String>,
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// See [`StorefrontConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let environment: Environment = env.parse_or("MARKETSTALL_ENV", Environment::Development)?;
        let production = environment == Environment::Production;

        let database_url = env
            .get("MARKETSTALL_DATABASE_URL")
            .or_else(|| env.get("DATABASE_URL"))
            .map(SecretString::from);
        if production && database_url.is_none() {
            return Err(ConfigError::MissingEnvVar(
                "MARKETSTALL_DATABASE_URL".to_owned(),
            ));
        }

        let host = env.parse_or("MARKETSTALL_HOST", IpAddr::from([127, 0, 0, 1]))?;
        let port = env.parse_or("MARKETSTALL_PORT", 3000_u16)?;
        let base_url = env
            .get("MARKETSTALL_BASE_URL")
            .unwrap_or_else(|| "http://localhost:3000".to_owned());
        url::Url::parse(&base_url).map_err(|e| {
            ConfigError::InvalidEnvVar("MARKETSTALL_BASE_URL".to_owned(), e.to_string())
        })?;

        let session_secret = match env.get("MARKETSTALL_SESSION_SECRET") {
            Some(value) => {
                check_session_secret(&value)?;
                SecretString::from(value)
            }
            None if production => {
                return Err(ConfigError::MissingEnvVar(
                    "MARKETSTALL_SESSION_SECRET".to_owned(),
                ));
            }
            None => {
                warn!("MARKETSTALL_SESSION_SECRET not set, using the insecure development secret");
                SecretString::from(INSECURE_DEVELOPMENT_SECRET)
            }
        };

        let cache_ttl = Duration::from_secs(env.parse_or("MARKETSTALL_CACHE_TTL_SECS", 300_u64)?);
        let cache_sweep_interval =
            Duration::from_secs(env.parse_or("MARKETSTALL_CACHE_SWEEP_SECS", 60_u64)?);
        if cache_sweep_interval.is_zero() {
            return Err(ConfigError::InvalidEnvVar(
                "MARKETSTALL_CACHE_SWEEP_SECS".to_owned(),
                "must be greater than zero".to_owned(),
            ));
        }
        let fallback_capacity = env.parse_or("MARKETSTALL_FALLBACK_CAPACITY", DEFAULT_CAPACITY)?;

        Ok(Self {
            environment,
            database_url,
            host,
            port,
            base_url,
            session_secret,
            cache_ttl,
            cache_sweep_interval,
            fallback_capacity,
            sentry_dsn: env.get("SENTRY_DSN"),
            sentry_environment: env.get("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies carry the `Secure` attribute.
    #[must_use]
    pub fn secure_cookies(&self) -> bool {
        self.environment == Environment::Production || self.base_url.starts_with("https://")
    }
}

/// Check a candidate session secret against the rules applied at startup.
///
/// # Errors
///
/// Returns `ConfigError::InsecureSecret` if the secret is too short, looks
/// like a placeholder, or has too little entropy.
pub fn check_session_secret(value: &str) -> Result<(), ConfigError> {
    const VAR: &str = "MARKETSTALL_SESSION_SECRET";
    validate_session_secret(&SecretString::from(value), VAR)?;
    validate_secret_strength(value, VAR)
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Variable lookup with empty values treated as unset.
struct Env<'a, F>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(key).map_or(Ok(default), |raw| {
            raw.trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_owned(), e.to_string()))
        })
    }
}

/// Validate that a session secret meets minimum length requirements.
fn validate_session_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SESSION_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_owned(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SESSION_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Err(ConfigError::InsecureSecret(
            var_name.to_owned(),
            format!("appears to be a placeholder (contains '{pattern}')"),
        ));
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_owned(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}
