//! Idempotency keys for financially-effective operations.
//!
//! Every mutating call with financial effect either accepts a caller
//! supplied key or derives one deterministically. The same key must always
//! resolve to the same outcome, even when submitted twice.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

use super::errors::ValidationError;
use super::ids::InvoiceId;

/// Caller-supplied or derived token that makes a repeated request have the
/// same effect as a single request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Wraps a caller-supplied key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is empty or longer than 255 bytes.
    pub fn new(key: impl Into<String>) -> Result<Self, ValidationError> {
        let key = key.into();
        if key.is_empty() {
            return Err(ValidationError::empty_field("idempotency_key"));
        }
        if key.len() > 255 {
            return Err(ValidationError::invalid_format(
                "idempotency_key",
                "must be at most 255 bytes",
            ));
        }
        Ok(Self(key))
    }

    /// Generates a fresh random key for callers that did not supply one.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Derives the retry key for a payment attempt.
    ///
    /// Deterministic over `(invoice_id, attempt_number)` so that overlapping
    /// retry sweeps produce the same key and the gateway collapses them into
    /// a single charge.
    pub fn for_payment_retry(invoice_id: &InvoiceId, attempt_number: u32) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(invoice_id.as_uuid().as_bytes());
        hasher.update(attempt_number.to_be_bytes());
        let digest = hasher.finalize();
        Self(format!("retry-{}", hex_encode(&digest[..16])))
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lowercase hex encoding without pulling in an extra crate.
pub fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push(char::from_digit((b >> 4) as u32, 16).unwrap_or('0'));
        out.push(char::from_digit((b & 0x0f) as u32, 16).unwrap_or('0'));
    }
    out
}
