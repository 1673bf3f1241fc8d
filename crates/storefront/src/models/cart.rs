//! Shopping cart types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use marketstall_core::{CartId, ProductId, UserId};

use crate::db::{Entity, Kind};

/// One line of a cart.
///
/// Only `id`, `product_id` and `quantity` have meaning to the server; any
/// other fields the client sends (variant, note, ...) are carried verbatim.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CartItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<ProductId>,
    /// Absent counts as one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl CartItem {
    /// A line for `quantity` units of `product_id`.
    #[must_use]
    pub fn for_product(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id: Some(product_id),
            quantity: Some(quantity),
            ..Self::default()
        }
    }

    /// Effective quantity.
    #[must_use]
    pub fn units(&self) -> u32 {
        self.quantity.unwrap_or(1)
    }
}

/// A user's cart. Each user owns at most one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub user_id: UserId,
    #[serde(default)]
    pub items: Vec<CartItem>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// An empty cart for `user_id`.
    #[must_use]
    pub fn empty(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id: CartId::generate(),
            user_id,
            items: Vec::new(),
            updated_at: now,
        }
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn unit_count(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.units())).sum()
    }
}

impl Entity for Cart {
    const KIND: Kind = Kind::Cart;

    fn id(&self) -> Uuid {
        self.id.as_uuid()
    }

    fn merge_key(&self) -> String {
        self.user_id.to_string()
    }
}
