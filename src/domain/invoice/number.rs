//! Sequential invoice numbers.
//!
//! Numbers are assigned once, at finalization, from a gapless per-tenant
//! sequence the repository owns. Drafts have no number.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

/// A finalized invoice's sequence number, rendered as `INV-00000042`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceNumber(u64);

impl InvoiceNumber {
    /// Wraps a sequence value. Sequences start at 1.
    pub fn from_sequence(sequence: u64) -> Result<Self, ValidationError> {
        if sequence == 0 {
            return Err(ValidationError::out_of_range(
                "invoice_number",
                1,
                i64::MAX,
                0,
            ));
        }
        Ok(Self(sequence))
    }

    pub fn sequence(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for InvoiceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "INV-{:08}", self.0)
    }
}

impl FromStr for InvoiceNumber {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("INV-").ok_or_else(|| {
            ValidationError::invalid_format("invoice_number", "missing INV- prefix")
        })?;
        let sequence: u64 = digits.parse().map_err(|_| {
            ValidationError::invalid_format("invoice_number", "non-numeric sequence")
        })?;
        Self::from_sequence(sequence)
    }
}
