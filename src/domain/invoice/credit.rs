//! Account credits.
//!
//! Credits are issued with a reason (goodwill, void adjustment, migration)
//! and drawn down oldest-first when an invoice finalizes. A draw never
//! takes an invoice below zero.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{AccountId, CreditId, Currency, Timestamp, ValidationError};

/// A balance an account can spend against future invoices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credit {
    id: CreditId,
    account_id: AccountId,
    currency: Currency,
    original_cents: i64,
    remaining_cents: i64,
    reason: String,
    created_at: Timestamp,
}

impl Credit {
    /// Issues a new credit.
    ///
    /// # Errors
    ///
    /// Returns an error if the amount is not positive or the reason is empty.
    pub fn issue(
        account_id: AccountId,
        cents: i64,
        currency: Currency,
        reason: impl Into<String>,
        now: Timestamp,
    ) -> Result<Self, ValidationError> {
        if cents <= 0 {
            return Err(ValidationError::out_of_range("amount", 1, i64::MAX, cents));
        }
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(ValidationError::empty_field("reason"));
        }
        Ok(Self {
            id: CreditId::new(),
            account_id,
            currency,
            original_cents: cents,
            remaining_cents: cents,
            reason,
            created_at: now,
        })
    }

    pub fn id(&self) -> CreditId {
        self.id
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn original_cents(&self) -> i64 {
        self.original_cents
    }

    pub fn remaining_cents(&self) -> i64 {
        self.remaining_cents
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining_cents == 0
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Draws up to `cents` from this credit, returning the amount taken.
    pub fn draw(&mut self, cents: i64) -> i64 {
        let taken = cents.clamp(0, self.remaining_cents);
        self.remaining_cents -= taken;
        taken
    }

    /// Rehydrates a credit from storage without validation.
    pub fn from_parts(
        id: CreditId,
        account_id: AccountId,
        currency: Currency,
        original_cents: i64,
        remaining_cents: i64,
        reason: String,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            account_id,
            currency,
            original_cents,
            remaining_cents,
            reason,
            created_at,
        }
    }
}

/// One credit's contribution to settling an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditDraw {
    pub credit_id: CreditId,
    pub cents: i64,
}

/// Draws down `due_cents` from the given credits in order (callers pass
/// them oldest-first). Stops once the due amount is covered; skips credits
/// in other currencies.
pub fn apply_credits(credits: &mut [Credit], due_cents: i64, currency: Currency) -> Vec<CreditDraw> {
    let mut outstanding = due_cents.max(0);
    let mut draws = Vec::new();
    for credit in credits.iter_mut() {
        if outstanding == 0 {
            break;
        }
        if credit.currency() != currency || credit.is_exhausted() {
            continue;
        }
        let taken = credit.draw(outstanding);
        if taken > 0 {
            draws.push(CreditDraw {
                credit_id: credit.id(),
                cents: taken,
            });
            outstanding -= taken;
        }
    }
    draws
}
