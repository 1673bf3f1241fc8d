//! Orders placed from a cart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use marketstall_core::{OrderId, OrderStatus, Price, ProductId, UserId};

use crate::db::{Entity, Kind};

/// A priced line captured at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Price,
    pub quantity: u32,
}

impl OrderLine {
    /// Unit price times quantity, `None` on overflow.
    #[must_use]
    pub fn line_total(&self) -> Option<Price> {
        self.unit_price.checked_times(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub lines: Vec<OrderLine>,
    /// Sum of line totals before any discount.
    pub subtotal: Price,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_code: Option<String>,
    pub total: Price,
    #[serde(default)]
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Order {
    const KIND: Kind = Kind::Order;

    fn id(&self) -> Uuid {
        self.id.as_uuid()
    }
}
