//! Checkout: price a user's cart and record it as an order.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, instrument, warn};

use marketstall_core::{OrderId, OrderStatus, Price, ProductId, UserId};

use crate::clock::Clock;
use crate::db::{Fetched, Filter, Repository, RepositoryError};
use crate::models::catalog::normalize_code;
use crate::models::{Cart, Discount, Order, OrderLine, Product};

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("cart is empty")]
    EmptyCart,

    #[error("cart line has no product")]
    LineWithoutProduct,

    #[error("product {0} is not for sale")]
    UnknownProduct(ProductId),

    #[error("only {available} of product {product_id} in stock")]
    InsufficientStock { product_id: ProductId, available: u32 },

    #[error("cart mixes currencies")]
    MixedCurrency,

    #[error("order total is out of range")]
    PriceOverflow,

    #[error("discount code is not valid")]
    InvalidDiscount,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Checkout against the fallback repository.
pub struct CheckoutService<'a> {
    repo: &'a Repository,
    clock: &'a dyn Clock,
}

impl<'a> CheckoutService<'a> {
    #[must_use]
    pub const fn new(repo: &'a Repository, clock: &'a dyn Clock) -> Self {
        Self { repo, clock }
    }

    /// Turn the user's cart into a pending order and empty the cart.
    ///
    /// Stock is decremented after the order is recorded. Follow-up writes that
    /// fail are logged; the order stands.
    ///
    /// # Errors
    ///
    /// See [`CheckoutError`].
    #[instrument(skip(self))]
    pub async fn place_order(
        &self,
        user_id: UserId,
        discount_code: Option<&str>,
    ) -> Result<Fetched<Order>, CheckoutError> {
        let cart = self
            .repo
            .cart_for(user_id)
            .await?
            .value
            .filter(|cart| !cart.items.is_empty())
            .ok_or(CheckoutError::EmptyCart)?;

        let mut lines = Vec::with_capacity(cart.items.len());
        for (product_id, quantity) in units_per_product(&cart)? {
            let product = self
                .repo
                .get::<Product>(product_id.as_uuid())
                .await?
                .value
                .filter(|p| p.active)
                .ok_or(CheckoutError::UnknownProduct(product_id))?;

            if product.stock < quantity {
                return Err(CheckoutError::InsufficientStock {
                    product_id,
                    available: product.stock,
                });
            }
            lines.push(OrderLine {
                product_id,
                name: product.name,
                unit_price: product.price,
                quantity,
            });
        }

        let subtotal = sum_lines(&lines)?;
        let (discount_code, total) = match discount_code {
            Some(code) => {
                let discount = self.active_discount(code).await?;
                let total = subtotal
                    .checked_less_percent(discount.percent_off)
                    .ok_or(CheckoutError::PriceOverflow)?;
                (Some(discount.code), total)
            }
            None => (None, subtotal),
        };

        let now = self.clock.now();
        let order = Order {
            id: OrderId::generate(),
            user_id,
            lines,
            subtotal,
            discount_code,
            total,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        let placed = self.repo.create(&order).await?;
        info!(order_id = %order.id, primary = placed.from_primary, "Order placed");

        self.settle(&cart, &order).await;
        Ok(placed)
    }

    async fn active_discount(&self, code: &str) -> Result<Discount, CheckoutError> {
        self.repo
            .find_one::<Discount>(Filter::eq("code", normalize_code(code)))
            .await?
            .value
            .filter(|d| d.active)
            .ok_or(CheckoutError::InvalidDiscount)
    }

    async fn settle(&self, cart: &Cart, order: &Order) {
        let mut empty = Map::new();
        empty.insert("items".to_owned(), Value::Array(Vec::new()));
        if let Err(e) = self.repo.update::<Cart>(cart.id.as_uuid(), empty).await {
            warn!(cart_id = %cart.id, error = %e, "Failed to empty cart after checkout");
        }

        for line in &order.lines {
            let Ok(Fetched {
                value: Some(product),
                ..
            }) = self.repo.get::<Product>(line.product_id.as_uuid()).await
            else {
                continue;
            };
            let mut patch = Map::new();
            patch.insert(
                "stock".to_owned(),
                Value::from(product.stock.saturating_sub(line.quantity)),
            );
            if let Err(e) = self.repo.update::<Product>(product.id.as_uuid(), patch).await {
                warn!(product_id = %product.id, error = %e, "Failed to decrement stock");
            }
        }
    }
}

/// Units ordered per product, in first-seen order.
///
/// Lines with different item ids can name the same product; stock is checked
/// against their sum.
fn units_per_product(cart: &Cart) -> Result<Vec<(ProductId, u32)>, CheckoutError> {
    let mut totals: Vec<(ProductId, u32)> = Vec::new();
    for item in &cart.items {
        let product_id = item.product_id.ok_or(CheckoutError::LineWithoutProduct)?;
        match totals.iter_mut().find(|(id, _)| *id == product_id) {
            Some((_, units)) => {
                *units = units
                    .checked_add(item.units())
                    .ok_or(CheckoutError::PriceOverflow)?;
            }
            None => totals.push((product_id, item.units())),
        }
    }
    Ok(totals)
}

fn sum_lines(lines: &[OrderLine]) -> Result<Price, CheckoutError> {
    let line_total = |line: &OrderLine| line.line_total().ok_or(CheckoutError::PriceOverflow);
    let mut iter = lines.iter();
    let first = line_total(iter.next().ok_or(CheckoutError::EmptyCart)?)?;
    iter.try_fold(first, |sum, line| {
        let next = line_total(line)?;
        if sum.currency_code != next.currency_code {
            return Err(CheckoutError::MixedCurrency);
        }
        sum.checked_add(next).ok_or(CheckoutError::PriceOverflow)
    })
}
