//! Monetary value objects.
//!
//! All monetary values are stored as i64 cents (never floats). Per-unit
//! usage prices need sub-cent resolution and are expressed in millicents
//! (thousandths of a cent) where noted.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use super::errors::ValidationError;

/// ISO 4217 currency codes the engine settles in.
static SUPPORTED_CURRENCIES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["USD", "EUR", "GBP", "CAD", "AUD", "CHF", "SEK", "NOK", "DKK", "JPY"]
        .into_iter()
        .collect()
});

/// Validated ISO 4217 currency code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency([u8; 3]);

impl Currency {
    /// Parses and validates a currency code.
    ///
    /// # Errors
    ///
    /// Returns an error if the code is not a supported three-letter
    /// uppercase ISO 4217 code.
    pub fn new(code: &str) -> Result<Self, ValidationError> {
        let upper = code.to_ascii_uppercase();
        if !SUPPORTED_CURRENCIES.contains(upper.as_str()) {
            return Err(ValidationError::invalid_format(
                "currency",
                format!("unsupported currency code '{}'", code),
            ));
        }
        let bytes = upper.as_bytes();
        Ok(Self([bytes[0], bytes[1], bytes[2]]))
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        // Constructed only from validated ASCII uppercase.
        std::str::from_utf8(&self.0).unwrap_or("???")
    }

    /// US dollars, the default settlement currency in tests and fixtures.
    pub fn usd() -> Self {
        Self(*b"USD")
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<String> for Currency {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Currency::new(&value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.as_str().to_string()
    }
}

/// An amount of money in a single currency, in integer cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    cents: i64,
    currency: Currency,
}

impl Money {
    /// Creates a money value from cents.
    pub fn from_cents(cents: i64, currency: Currency) -> Self {
        Self { cents, currency }
    }

    /// Zero in the given currency.
    pub fn zero(currency: Currency) -> Self {
        Self { cents: 0, currency }
    }

    /// The amount in cents.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// The currency of this amount.
    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.cents == 0
    }

    pub fn is_negative(&self) -> bool {
        self.cents < 0
    }

    /// Adds two amounts of the same currency.
    ///
    /// # Errors
    ///
    /// Returns an error on currency mismatch or i64 overflow.
    pub fn checked_add(&self, other: &Money) -> Result<Money, ValidationError> {
        self.require_same_currency(other)?;
        let cents = self.cents.checked_add(other.cents).ok_or_else(|| {
            ValidationError::invalid_format("amount", "amount overflow".to_string())
        })?;
        Ok(Money::from_cents(cents, self.currency))
    }

    /// Subtracts another amount of the same currency.
    ///
    /// # Errors
    ///
    /// Returns an error on currency mismatch or i64 overflow.
    pub fn checked_sub(&self, other: &Money) -> Result<Money, ValidationError> {
        self.require_same_currency(other)?;
        let cents = self.cents.checked_sub(other.cents).ok_or_else(|| {
            ValidationError::invalid_format("amount", "amount overflow".to_string())
        })?;
        Ok(Money::from_cents(cents, self.currency))
    }

    /// Multiplies by an integer quantity, saturating at i64 bounds.
    pub fn scaled_by(&self, quantity: i64) -> Money {
        Money::from_cents(self.cents.saturating_mul(quantity), self.currency)
    }

    fn require_same_currency(&self, other: &Money) -> Result<(), ValidationError> {
        if self.currency != other.currency {
            return Err(ValidationError::invalid_format(
                "currency",
                format!(
                    "currency mismatch: {} vs {}",
                    self.currency, other.currency
                ),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.cents < 0 { "-" } else { "" };
        let abs = self.cents.unsigned_abs();
        write!(f, "{}{}.{:02} {}", sign, abs / 100, abs % 100, self.currency)
    }
}
