use crate::error::PaymentError;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A positive monetary amount in the shop's currency (KES).
///
/// Wraps `rust_decimal::Decimal` so that amounts reported by the gateway and
/// service prices are compared exactly, never through binary floating point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, PaymentError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(PaymentError::ValidationError(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// The amount as a whole number of currency units, fractions truncated.
    ///
    /// Push requests only accept integral amounts of at least one unit.
    pub fn whole_units(&self) -> Result<i64, PaymentError> {
        match self.0.trunc().to_i64() {
            Some(units) if units >= 1 => Ok(units),
            Some(_) => Err(PaymentError::ValidationError(format!(
                "Amount {} is below one whole unit",
                self.0
            ))),
            None => Err(PaymentError::ValidationError(format!(
                "Amount {} is out of range",
                self.0
            ))),
        }
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = PaymentError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl FromStr for Amount {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim())
            .map_err(|e| PaymentError::ValidationError(format!("Invalid amount {s:?}: {e}")))?;
        Self::new(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Recorded when a completed payment's amount differs from the service price.
///
/// The payment is still accepted; the discrepancy is kept for operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountMismatch {
    pub expected: Amount,
    pub paid: Amount,
}

impl AmountMismatch {
    pub fn between(expected: Amount, paid: Amount) -> Option<Self> {
        (expected != paid).then_some(Self { expected, paid })
    }

    pub fn is_underpayment(&self) -> bool {
        self.paid < self.expected
    }
}
