//! Norwegian krone amounts.
//!
//! Amounts are held as whole øre so arithmetic over line items and
//! totals stays exact. The database stores the øre value directly;
//! [`Decimal`] is only used at the edges (parsing, display).

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::ops::Add;
use std::str::FromStr;

/// A non-negative NOK amount with øre precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Nok(i64);

impl Nok {
    pub const ZERO: Self = Self(0);

    /// Creates an amount from whole øre (e.g. 12345 øre = 123.45 NOK).
    pub fn from_ore(ore: i64) -> Result<Self, InvalidAmountError> {
        if ore < 0 {
            return Err(InvalidAmountError::Negative(Decimal::new(ore, 2)));
        }
        Ok(Self(ore))
    }

    /// Creates an amount from a decimal NOK value.
    ///
    /// Rejects negative values and values with sub-øre precision.
    pub fn from_decimal(value: Decimal) -> Result<Self, InvalidAmountError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(InvalidAmountError::Negative(value));
        }
        let scaled = value * Decimal::ONE_HUNDRED;
        if scaled.fract() != Decimal::ZERO {
            return Err(InvalidAmountError::SubOrePrecision(value));
        }
        scaled
            .to_i64()
            .map(Self)
            .ok_or(InvalidAmountError::Overflow(value))
    }

    pub const fn as_ore(self) -> i64 {
        self.0
    }

    pub fn as_decimal(self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Multiplies by a line quantity, failing on overflow.
    pub fn times(self, quantity: i64) -> Result<Self, InvalidAmountError> {
        if quantity < 0 {
            return Err(InvalidAmountError::NegativeQuantity(quantity));
        }
        self.0
            .checked_mul(quantity)
            .map(Self)
            .ok_or(InvalidAmountError::Overflow(self.as_decimal()))
    }

    pub fn checked_add(self, rhs: Self) -> Result<Self, InvalidAmountError> {
        self.0
            .checked_add(rhs.0)
            .map(Self)
            .ok_or(InvalidAmountError::Overflow(self.as_decimal()))
    }
}

impl Display for Nok {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_decimal())
    }
}

impl FromStr for Nok {
    type Err = InvalidAmountError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let decimal =
            Decimal::from_str(value).map_err(|_| InvalidAmountError::Unparseable(value.into()))?;
        Self::from_decimal(decimal)
    }
}

impl TryFrom<Decimal> for Nok {
    type Error = InvalidAmountError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::from_decimal(value)
    }
}

impl From<Nok> for Decimal {
    fn from(value: Nok) -> Self {
        value.as_decimal()
    }
}

impl Add for Nok {
    type Output = Result<Self, InvalidAmountError>;

    fn add(self, rhs: Self) -> Self::Output {
        self.checked_add(rhs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidAmountError {
    #[error("amount cannot be negative: {0}")]
    Negative(Decimal),
    #[error("amount has sub-øre precision: {0}")]
    SubOrePrecision(Decimal),
    #[error("quantity cannot be negative: {0}")]
    NegativeQuantity(i64),
    #[error("amount overflow at {0}")]
    Overflow(Decimal),
    #[error("not a decimal amount: {0}")]
    Unparseable(String),
}
