//! Payment attempts.
//!
//! One row per charge submitted to the gateway, keyed by an idempotency
//! key. An invoice is never `Paid` without a recorded succeeded attempt.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    AccountId, BillingError, IdempotencyKey, InvoiceId, Money, PaymentAttemptId, StateMachine,
    Timestamp,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Pending,
    Succeeded,
    Failed,
}

impl StateMachine for AttemptStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use AttemptStatus::*;
        matches!((self, target), (Pending, Succeeded) | (Pending, Failed))
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use AttemptStatus::*;
        match self {
            Pending => vec![Succeeded, Failed],
            Succeeded => vec![],
            Failed => vec![],
        }
    }
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Pending => "pending",
            AttemptStatus::Succeeded => "succeeded",
            AttemptStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAttempt {
    id: PaymentAttemptId,
    invoice_id: InvoiceId,
    account_id: AccountId,
    attempt_number: u32,
    idempotency_key: IdempotencyKey,
    amount: Money,
    status: AttemptStatus,
    failure_reason: Option<String>,
    transaction_ref: Option<String>,
    needs_reconciliation: bool,
    created_at: Timestamp,
    resolved_at: Option<Timestamp>,
}

impl PaymentAttempt {
    /// Opens a pending attempt before the gateway call is made. Recording
    /// first means a crash mid-charge leaves evidence to reconcile against.
    pub fn open(
        invoice_id: InvoiceId,
        account_id: AccountId,
        attempt_number: u32,
        idempotency_key: IdempotencyKey,
        amount: Money,
        now: Timestamp,
    ) -> Self {
        Self {
            id: PaymentAttemptId::new(),
            invoice_id,
            account_id,
            attempt_number,
            idempotency_key,
            amount,
            status: AttemptStatus::Pending,
            failure_reason: None,
            transaction_ref: None,
            needs_reconciliation: false,
            created_at: now,
            resolved_at: None,
        }
    }

    pub fn id(&self) -> PaymentAttemptId {
        self.id
    }

    pub fn invoice_id(&self) -> InvoiceId {
        self.invoice_id
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    pub fn attempt_number(&self) -> u32 {
        self.attempt_number
    }

    pub fn idempotency_key(&self) -> &IdempotencyKey {
        &self.idempotency_key
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn status(&self) -> AttemptStatus {
        self.status
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn transaction_ref(&self) -> Option<&str> {
        self.transaction_ref.as_deref()
    }

    pub fn needs_reconciliation(&self) -> bool {
        self.needs_reconciliation
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn resolved_at(&self) -> Option<Timestamp> {
        self.resolved_at
    }

    /// Records a successful charge with the gateway's transaction ref.
    pub fn succeed(
        &mut self,
        transaction_ref: impl Into<String>,
        now: Timestamp,
    ) -> Result<(), BillingError> {
        self.status = self.status.transition_to(AttemptStatus::Succeeded)?;
        self.transaction_ref = Some(transaction_ref.into());
        self.resolved_at = Some(now);
        Ok(())
    }

    /// Records a declined or errored charge.
    pub fn fail(&mut self, reason: impl Into<String>, now: Timestamp) -> Result<(), BillingError> {
        self.status = self.status.transition_to(AttemptStatus::Failed)?;
        self.failure_reason = Some(reason.into());
        self.resolved_at = Some(now);
        Ok(())
    }

    /// Records a gateway timeout. The charge outcome is unknown, so the
    /// attempt fails provisionally and is flagged for reconciliation
    /// against the gateway's records.
    pub fn fail_timeout(&mut self, now: Timestamp) -> Result<(), BillingError> {
        self.fail("timeout", now)?;
        self.needs_reconciliation = true;
        Ok(())
    }

    /// Flips a timed-out attempt to succeeded after the gateway confirmed
    /// the charge actually went through. Only reconciliation may override
    /// a terminal status; the gateway is the source of truth here.
    pub fn reconcile_succeeded(
        &mut self,
        transaction_ref: impl Into<String>,
        now: Timestamp,
    ) -> Result<(), BillingError> {
        if !self.needs_reconciliation {
            return Err(BillingError::conflict(format!(
                "attempt {} is not awaiting reconciliation",
                self.id
            )));
        }
        self.status = AttemptStatus::Succeeded;
        self.transaction_ref = Some(transaction_ref.into());
        self.failure_reason = None;
        self.needs_reconciliation = false;
        self.resolved_at = Some(now);
        Ok(())
    }

    /// Confirms a timed-out attempt really did fail at the gateway.
    pub fn reconcile_failed(&mut self, now: Timestamp) -> Result<(), BillingError> {
        if !self.needs_reconciliation {
            return Err(BillingError::conflict(format!(
                "attempt {} is not awaiting reconciliation",
                self.id
            )));
        }
        self.needs_reconciliation = false;
        self.resolved_at = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::Currency;

    fn attempt() -> PaymentAttempt {
        PaymentAttempt::open(
            InvoiceId::new(),
            AccountId::new(),
            1,
            IdempotencyKey::generate(),
            Money::from_cents(4900, Currency::usd()),
            Timestamp::now(),
        )
    }

    #[test]
    fn succeed_records_transaction_ref() {
        let mut a = attempt();
        a.succeed("txn_123", Timestamp::now()).unwrap();
        assert_eq!(a.status(), AttemptStatus::Succeeded);
        assert_eq!(a.transaction_ref(), Some("txn_123"));
        assert!(a.resolved_at().is_some());
    }

    #[test]
    fn resolved_attempt_cannot_resolve_again() {
        let mut a = attempt();
        a.fail("card_declined", Timestamp::now()).unwrap();
        assert!(a.succeed("txn_123", Timestamp::now()).is_err());
        assert!(a.fail("again", Timestamp::now()).is_err());
    }

    #[test]
    fn timeout_flags_reconciliation() {
        let mut a = attempt();
        a.fail_timeout(Timestamp::now()).unwrap();
        assert_eq!(a.status(), AttemptStatus::Failed);
        assert_eq!(a.failure_reason(), Some("timeout"));
        assert!(a.needs_reconciliation());
    }

    #[test]
    fn reconciliation_can_flip_timeout_to_success() {
        let mut a = attempt();
        a.fail_timeout(Timestamp::now()).unwrap();
        a.reconcile_succeeded("txn_late", Timestamp::now()).unwrap();
        assert_eq!(a.status(), AttemptStatus::Succeeded);
        assert_eq!(a.transaction_ref(), Some("txn_late"));
        assert!(!a.needs_reconciliation());
        assert!(a.failure_reason().is_none());
    }

    #[test]
    fn reconciliation_requires_the_flag() {
        let mut a = attempt();
        a.fail("card_declined", Timestamp::now()).unwrap();
        assert!(a.reconcile_succeeded("txn", Timestamp::now()).is_err());
        assert!(a.reconcile_failed(Timestamp::now()).is_err());
    }

    #[test]
    fn reconcile_failed_keeps_failure_and_clears_flag() {
        let mut a = attempt();
        a.fail_timeout(Timestamp::now()).unwrap();
        a.reconcile_failed(Timestamp::now()).unwrap();
        assert_eq!(a.status(), AttemptStatus::Failed);
        assert!(!a.needs_reconciliation());
    }
}
