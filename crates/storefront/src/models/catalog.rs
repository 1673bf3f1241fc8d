//! Catalog types: products and discount codes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use marketstall_core::{DiscountId, Price, ProductId};

use crate::db::{Entity, Kind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Price,
    /// Units available for sale.
    #[serde(default)]
    pub stock: u32,
    #[serde(default = "default_true")]
    pub active: bool,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Product {
    const KIND: Kind = Kind::Product;

    fn id(&self) -> Uuid {
        self.id.as_uuid()
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("product name is required".to_owned());
        }
        if !self.price.is_in_range() {
            return Err(format!(
                "price must be between 0 and {}",
                Price::MAX_WHOLE_UNITS
            ));
        }
        Ok(())
    }
}

/// A percentage discount redeemable by code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discount {
    pub id: DiscountId,
    /// Stored normalized; see [`normalize_code`].
    pub code: String,
    pub percent_off: u8,
    #[serde(default = "default_true")]
    pub active: bool,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Discount {
    const KIND: Kind = Kind::Discount;

    fn id(&self) -> Uuid {
        self.id.as_uuid()
    }

    fn merge_key(&self) -> String {
        normalize_code(&self.code)
    }

    fn validate(&self) -> Result<(), String> {
        if self.code.trim().is_empty() {
            return Err("discount code is required".to_owned());
        }
        if !(1..=100).contains(&self.percent_off) {
            return Err("percent_off must be between 1 and 100".to_owned());
        }
        Ok(())
    }
}

/// Canonical spelling of a discount code (trimmed, upper-cased).
#[must_use]
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use marketstall_core::CurrencyCode;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_discount_merge_key_ignores_case_and_padding() {
        let discount = Discount {
            id: DiscountId::generate(),
            code: " save10 ".to_owned(),
            percent_off: 10,
            active: true,
            updated_at: Utc::now(),
        };
        assert_eq!(discount.merge_key(), "SAVE10");
    }

    #[test]
    fn test_product_merge_key_is_id() {
        let product = Product {
            id: ProductId::generate(),
            name: "Mug".to_owned(),
            description: String::new(),
            price: Price::from_minor_units(1200, CurrencyCode::USD),
            stock: 5,
            active: true,
            updated_at: Utc::now(),
        };
        assert_eq!(product.merge_key(), product.id.to_string());
    }

    #[test]
    fn test_product_validation() {
        let mug = Product {
            id: ProductId::generate(),
            name: "Mug".to_owned(),
            description: String::new(),
            price: Price::from_minor_units(1200, CurrencyCode::USD),
            stock: 5,
            active: true,
            updated_at: Utc::now(),
        };
        assert!(mug.validate().is_ok());

        let blank = Product {
            name: " ".to_owned(),
            ..mug.clone()
        };
        assert!(blank.validate().is_err());

        let priceless = Product {
            price: Price::from_minor_units(-1, CurrencyCode::USD),
            ..mug.clone()
        };
        assert!(priceless.validate().is_err());

        let extravagant = Product {
            price: Price::from_minor_units((Price::MAX_WHOLE_UNITS + 1) * 100, CurrencyCode::USD),
            ..mug
        };
        assert!(extravagant.validate().is_err());
    }

    #[test]
    fn test_discount_validation() {
        let discount = Discount {
            id: DiscountId::generate(),
            code: "SAVE".to_owned(),
            percent_off: 0,
            active: true,
            updated_at: Utc::now(),
        };
        assert!(discount.validate().is_err());
        assert!(Discount { percent_off: 100, ..discount.clone() }.validate().is_ok());
        assert!(Discount { percent_off: 101, ..discount }.validate().is_err());
    }

    #[test]
    fn test_product_defaults() {
        let product: Product = serde_json::from_value(json!({
            "id": ProductId::generate(),
            "name": "Mug",
            "price": {"amount": "12.00"},
            "updated_at": "2026-01-01T00:00:00Z"
        }))
        .unwrap();
        assert!(product.active);
        assert_eq!(product.stock, 0);
        assert_eq!(product.price.currency_code, CurrencyCode::USD);
    }
}
