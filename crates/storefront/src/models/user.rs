//! User domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use marketstall_core::{Email, Role, UserId};

use super::SessionClaims;
use crate::db::{Entity, Kind};

/// A storefront account as stored.
///
/// Holds the password hash; never serialize this type into a response.
/// Use [`UserProfile`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Stored normalized (trimmed, lower-cased).
    pub email: Email,
    pub name: String,
    pub role: Role,
    /// Argon2 PHC string.
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Claims for a session belonging to this user.
    #[must_use]
    pub fn claims(&self) -> SessionClaims {
        SessionClaims {
            subject: self.id,
            email: self.email.clone(),
            name: self.name.clone(),
            role: self.role,
        }
    }
}

impl Entity for User {
    const KIND: Kind = Kind::User;

    fn id(&self) -> Uuid {
        self.id.as_uuid()
    }

    fn merge_key(&self) -> String {
        self.email.merge_key()
    }
}

/// Public view of a [`User`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub id: UserId,
    pub email: Email,
    pub name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
            created_at: user.created_at,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_key_is_normalized_email() {
        let user = User {
            id: UserId::generate(),
            email: Email::parse("  Shopper@Example.COM ").unwrap(),
            name: "Shopper".to_owned(),
            role: Role::User,
            password_hash: "$argon2id$...".to_owned(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(user.merge_key(), "shopper@example.com");
    }

    #[test]
    fn test_profile_has_no_password_hash() {
        let user = User {
            id: UserId::generate(),
            email: Email::parse("a@b.co").unwrap(),
            name: "A".to_owned(),
            role: Role::Admin,
            password_hash: "secret-hash".to_owned(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_string(&UserProfile::from(&user)).unwrap();
        assert!(!json.contains("secret-hash"));
        assert!(!json.contains("password"));
    }
}
