//! Session-related types.
//!
//! Claims are the identity carried inside a signed session token. They are
//! never stored server-side; every request re-derives them from the token.

use serde::{Deserialize, Serialize};

use marketstall_core::{Capability, Email, Role, UserId};

/// Identity and role embedded in a session token.
///
/// Immutable once issued: a role change or rename produces a new token.
/// Field order and names are part of the token wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User's ID (serialized as `id`).
    #[serde(rename = "id")]
    pub subject: UserId,
    /// User's email address.
    pub email: Email,
    /// Display name.
    pub name: String,
    /// Role used for capability checks.
    pub role: Role,
}

impl SessionClaims {
    /// Returns true if the session's role grants `capability`.
    #[must_use]
    pub const fn can(&self, capability: Capability) -> bool {
        self.role.allows(capability)
    }
}
