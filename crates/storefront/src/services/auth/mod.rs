//! Authentication service.
//!
//! Password accounts stored through the fallback repository. Registration and
//! login both see users from either tier, so an account created while the
//! database was down can still sign in.

mod error;

pub use error::AuthError;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use tracing::{info, instrument};

use marketstall_core::email::normalize;
use marketstall_core::{Email, Role, UserId};

use crate::clock::Clock;
use crate::db::{Fetched, Filter, Repository, RepositoryError};
use crate::models::User;

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum display name length.
const MAX_NAME_LENGTH: usize = 100;

/// Authentication service.
pub struct AuthService<'a> {
    repo: &'a Repository,
    clock: &'a dyn Clock,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(repo: &'a Repository, clock: &'a dyn Clock) -> Self {
        Self { repo, clock }
    }

    /// Register a new user with email and password.
    ///
    /// New accounts always get [`Role::User`].
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` if the email format is invalid.
    /// Returns `AuthError::InvalidName` if the display name is empty or too long.
    /// Returns `AuthError::WeakPassword` if the password doesn't meet requirements.
    /// Returns `AuthError::UserAlreadyExists` if the email is already registered in either tier.
    #[instrument(skip(self, password, name))]
    pub async fn register(
        &self,
        email: &str,
        name: &str,
        password: &str,
    ) -> Result<Fetched<User>, AuthError> {
        let email = Email::parse(&normalize(email))?;
        let name = validate_name(name)?;
        validate_password(password)?;

        if self.find_by_email(&email).await?.value.is_some() {
            return Err(AuthError::UserAlreadyExists);
        }

        let now = self.clock.now();
        let user = User {
            id: UserId::generate(),
            email,
            name,
            role: Role::User,
            password_hash: hash_password(password)?,
            created_at: now,
            updated_at: now,
        };

        let created = self.repo.create(&user).await.map_err(|e| match e {
            RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
            other => AuthError::Repository(other),
        })?;

        info!(user_id = %created.value.id, primary = created.from_primary, "User registered");
        Ok(created)
    }

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email is unknown or the
    /// password is wrong.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<Fetched<User>, AuthError> {
        let email = Email::parse(&normalize(email)).map_err(|_| AuthError::InvalidCredentials)?;

        let found = self.find_by_email(&email).await?;
        let from_primary = found.from_primary;
        let user = found.value.ok_or(AuthError::InvalidCredentials)?;

        verify_password(password, &user.password_hash)?;

        Ok(Fetched {
            value: user,
            from_primary,
        })
    }

    async fn find_by_email(&self, email: &Email) -> Result<Fetched<Option<User>>, AuthError> {
        Ok(self
            .repo
            .find_one::<User>(Filter::eq("email", email.as_str()))
            .await?)
    }
}

/// Validate a display name and return it trimmed.
fn validate_name(name: &str) -> Result<String, AuthError> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LENGTH {
        return Err(AuthError::InvalidName(format!(
            "name must be 1 to {MAX_NAME_LENGTH} characters"
        )));
    }
    Ok(name.to_owned())
}

/// Validate password meets requirements.
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}
