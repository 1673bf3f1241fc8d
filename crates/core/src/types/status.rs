//! Status enums for various entities.

use serde::{Deserialize, Serialize};

/// Lifecycle of an order placed through the storefront.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Paid,
    Fulfilled,
    Cancelled,
}

impl OrderStatus {
    /// Returns true once no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Fulfilled | Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Paid.is_terminal());
        assert!(OrderStatus::Fulfilled.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_serde_spelling() {
        let json = serde_json::to_string(&OrderStatus::Fulfilled).unwrap_or_default();
        assert_eq!(json, "\"fulfilled\"");
    }
}
