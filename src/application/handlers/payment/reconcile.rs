//! Reconciliation of timed-out payment attempts.
//!
//! Two paths converge here: asynchronous gateway notifications (pushed,
//! signed) and the retry sweep's status queries (pulled). Both resolve
//! an attempt flagged by `fail_timeout` against what the gateway says
//! actually happened. The gateway's record wins.

use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::foundation::{BillingError, Timestamp};
use crate::domain::invoice::InvoiceStatus;
use crate::domain::payment::{AttemptStatus, DunningLevel, PaymentAttempt};
use crate::ports::{
    ChargeOutcome, Clock, DunningLedger, EntityLock, InvoiceRepository, LockScope, Notification,
    NotificationKind, Notifier, PaymentAttemptRepository, PaymentGateway,
};

pub struct ReconcilePayments {
    invoices: Arc<dyn InvoiceRepository>,
    attempts: Arc<dyn PaymentAttemptRepository>,
    gateway: Arc<dyn PaymentGateway>,
    dunning: Arc<dyn DunningLedger>,
    notifier: Arc<dyn Notifier>,
    locks: Arc<dyn EntityLock>,
    clock: Arc<dyn Clock>,
}

impl ReconcilePayments {
    pub fn new(
        invoices: Arc<dyn InvoiceRepository>,
        attempts: Arc<dyn PaymentAttemptRepository>,
        gateway: Arc<dyn PaymentGateway>,
        dunning: Arc<dyn DunningLedger>,
        notifier: Arc<dyn Notifier>,
        locks: Arc<dyn EntityLock>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            invoices,
            attempts,
            gateway,
            dunning,
            notifier,
            locks,
            clock,
        }
    }

    /// Handles a pushed gateway notification. The raw payload is verified
    /// against its signature before anything else happens.
    pub async fn handle_notification(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<(), BillingError> {
        let now = self.clock.now();
        let notification = self.gateway.verify_notification(payload, signature, now)?;

        let Some(attempt) = self
            .attempts
            .find_by_idempotency_key(&notification.idempotency_key)
            .await?
        else {
            // The gateway may notify about charges we never recorded, for
            // example after a crash before the attempt row was written.
            warn!(
                key = %notification.idempotency_key,
                "notification for an unknown payment attempt, ignoring"
            );
            return Ok(());
        };

        match notification.kind {
            NotificationKind::Settled => {
                self.apply_settlement(attempt, &notification.transaction_ref, now)
                    .await
            }
            NotificationKind::Failed => self.apply_failure(attempt, now).await,
        }
    }

    /// Asks the gateway what became of one flagged attempt and records
    /// the answer. `None` from the gateway means the charge never landed,
    /// which confirms the provisional failure.
    pub async fn reconcile_attempt(&self, attempt: PaymentAttempt) -> Result<(), BillingError> {
        if !attempt.needs_reconciliation() {
            return Ok(());
        }
        let now = self.clock.now();
        match self.gateway.query_status(attempt.idempotency_key()).await? {
            Some(ChargeOutcome::Approved { transaction_ref }) => {
                self.apply_settlement(attempt, &transaction_ref, now).await
            }
            Some(ChargeOutcome::Declined { .. }) | None => self.apply_failure(attempt, now).await,
        }
    }

    async fn apply_settlement(
        &self,
        mut attempt: PaymentAttempt,
        transaction_ref: &str,
        now: Timestamp,
    ) -> Result<(), BillingError> {
        if attempt.status() == AttemptStatus::Succeeded {
            // Already applied; notifications are at-least-once.
            return Ok(());
        }
        if !attempt.needs_reconciliation() {
            warn!(
                attempt_id = %attempt.id(),
                "gateway reports settlement for an attempt we recorded as declined"
            );
            return Ok(());
        }

        let _lease = self
            .locks
            .acquire(LockScope::Invoice(attempt.invoice_id()))
            .await?;

        attempt.reconcile_succeeded(transaction_ref, now)?;
        self.attempts.save(&attempt).await?;

        let Some(mut invoice) = self.invoices.find(attempt.invoice_id()).await? else {
            return Ok(());
        };
        if invoice.status() != InvoiceStatus::Open {
            return Ok(());
        }
        invoice.record_payment(now)?;
        self.invoices.save(&invoice).await?;

        let still_overdue = self
            .invoices
            .list_open_for_account(invoice.account_id())
            .await?
            .iter()
            .any(|i| i.days_past_due(now).unwrap_or(-1) > 0);
        if !still_overdue {
            self.dunning
                .set_level(invoice.account_id(), DunningLevel::Current, now)
                .await?;
        }

        info!(
            invoice_id = %invoice.id(),
            attempt_id = %attempt.id(),
            "timed-out charge reconciled as settled"
        );
        if let Err(err) = self
            .notifier
            .notify(Notification::PaymentSucceeded {
                account_id: invoice.account_id(),
                invoice_id: invoice.id(),
                amount: invoice.amount_due(),
            })
            .await
        {
            warn!(%err, "notification delivery failed");
        }
        Ok(())
    }

    async fn apply_failure(
        &self,
        mut attempt: PaymentAttempt,
        now: Timestamp,
    ) -> Result<(), BillingError> {
        if !attempt.needs_reconciliation() {
            return Ok(());
        }
        let _lease = self
            .locks
            .acquire(LockScope::Invoice(attempt.invoice_id()))
            .await?;
        attempt.reconcile_failed(now)?;
        self.attempts.save(&attempt).await?;
        info!(
            attempt_id = %attempt.id(),
            invoice_id = %attempt.invoice_id(),
            "timed-out charge confirmed failed"
        );
        Ok(())
    }
}
