//! Type-safe price representation using decimal arithmetic.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A price with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the currency's standard unit (e.g., dollars, not cents).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    #[serde(default)]
    pub currency_code: CurrencyCode,
}

impl Price {
    /// Largest unit price accepted for sale, in whole currency units.
    pub const MAX_WHOLE_UNITS: i64 = 1_000_000;

    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal, currency_code: CurrencyCode) -> Self {
        Self {
            amount,
            currency_code,
        }
    }

    /// Create a price from an amount in minor units (e.g., cents).
    #[must_use]
    pub fn from_minor_units(minor: i64, currency_code: CurrencyCode) -> Self {
        Self::new(Decimal::new(minor, 2), currency_code)
    }

    /// A zero amount in the given currency.
    #[must_use]
    pub const fn zero(currency_code: CurrencyCode) -> Self {
        Self::new(Decimal::ZERO, currency_code)
    }

    /// Whether the amount is non-negative and at most [`Price::MAX_WHOLE_UNITS`].
    #[must_use]
    pub fn is_in_range(&self) -> bool {
        !self.amount.is_sign_negative() && self.amount <= Decimal::from(Self::MAX_WHOLE_UNITS)
    }

    /// Price of `quantity` units, or `None` on overflow.
    #[must_use]
    pub fn checked_times(self, quantity: u32) -> Option<Self> {
        self.amount
            .checked_mul(Decimal::from(quantity))
            .map(|amount| Self::new(amount, self.currency_code))
    }

    /// Apply a percentage discount, clamped to 0..=100 and rounded to cents.
    ///
    /// `None` on overflow.
    #[must_use]
    pub fn checked_less_percent(self, percent: u8) -> Option<Self> {
        let percent = Decimal::from(percent.min(100));
        let off = self.amount.checked_mul(percent)? / Decimal::ONE_HUNDRED;
        let amount = self.amount.checked_sub(off)?;
        Some(Self::new(amount.round_dp(2), self.currency_code))
    }

    /// Add two prices, returning `None` when the currencies differ or the sum overflows.
    #[must_use]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        if self.currency_code != other.currency_code {
            return None;
        }
        self.amount
            .checked_add(other.amount)
            .map(|amount| Self::new(amount, self.currency_code))
    }
}

/// ISO 4217 currency codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    USD,
    EUR,
    GBP,
    CAD,
    AUD,
}
