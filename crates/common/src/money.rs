//! Decimal money amounts.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A money amount in the store's single currency.
///
/// Backed by `Decimal` so that line totals never pick up binary
/// floating-point error. Serialized as a decimal string (`"19.99"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

/// Decimal places kept by the `NUMERIC(12, 2)` amount columns.
const AMOUNT_SCALE: u32 = 2;

/// Exclusive upper bound on stored amounts (10^10).
const AMOUNT_LIMIT: Decimal = Decimal::from_parts(1_410_065_408, 2, 0, false, 0);

impl Money {
    /// Wraps a decimal amount.
    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Creates an amount from a count of cents (`1999` is `19.99`).
    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, 2))
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Returns the underlying decimal.
    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// Returns true if the amount is below zero.
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Returns true if the amount fits a `NUMERIC(12, 2)` column without
    /// rounding: at most two decimal places and below 10^10 in magnitude.
    pub fn fits_amount_column(&self) -> bool {
        self.0.normalize().scale() <= AMOUNT_SCALE && self.0.abs() < AMOUNT_LIMIT
    }

    /// Multiplies by a quantity, or `None` on overflow.
    pub fn checked_multiply(&self, quantity: u32) -> Option<Money> {
        self.0.checked_mul(Decimal::from(quantity)).map(Money)
    }

    /// Adds two amounts, or `None` on overflow.
    pub fn checked_add(&self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}
