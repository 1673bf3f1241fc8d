//! Session roles and the capabilities they grant.
//!
//! Roles travel inside signed session tokens, so the serialized spelling
//! (`"user"`, `"admin"`) is part of the token format.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Role carried by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A regular shopper.
    #[default]
    User,
    /// Store staff with access to the admin console.
    Admin,
}

/// Something a handler may require of the caller's role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Browse, keep a cart, place orders and write reviews.
    Shop,
    /// Manage catalog, discounts, users, caches and the fallback store.
    Administer,
}

impl Role {
    /// Returns true if this role grants `capability`.
    #[must_use]
    pub const fn allows(self, capability: Capability) -> bool {
        match capability {
            Capability::Shop => true,
            Capability::Administer => matches!(self, Self::Admin),
        }
    }

    /// The serialized spelling of this role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown role name.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid role: {0}")]
pub struct RoleParseError(String);

impl std::str::FromStr for Role {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(RoleParseError(other.to_owned())),
        }
    }
}
