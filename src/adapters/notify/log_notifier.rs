//! Tracing-backed notifier.
//!
//! Terminal delivery for deployments without a real messaging channel:
//! each notification becomes a structured log event.

use async_trait::async_trait;
use tracing::info;

use crate::ports::{Notification, Notifier, NotifyError};

#[derive(Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        match &notification {
            Notification::InvoiceFinalized {
                account_id,
                number,
                amount_due,
                due_at,
                ..
            } => info!(
                %account_id,
                number = %number,
                amount_due_cents = amount_due.cents(),
                due_at = %due_at,
                "notification: invoice finalized"
            ),
            Notification::PaymentSucceeded {
                account_id, amount, ..
            } => info!(
                %account_id,
                amount_cents = amount.cents(),
                "notification: payment succeeded"
            ),
            Notification::PaymentFailed {
                account_id,
                reason,
                next_retry_at,
                ..
            } => info!(
                %account_id,
                reason,
                next_retry_at = next_retry_at.map(|t| t.to_string()),
                "notification: payment failed"
            ),
            Notification::AccountWarned { account_id, .. } => {
                info!(%account_id, "notification: account warned")
            }
            Notification::AccountBlocked { account_id, .. } => {
                info!(%account_id, "notification: account blocked")
            }
            Notification::SubscriptionExpired {
                account_id,
                subscription_id,
            } => info!(
                %account_id,
                %subscription_id,
                "notification: subscription expired"
            ),
            Notification::SubscriptionCancelled {
                account_id,
                subscription_id,
                reason,
            } => info!(
                %account_id,
                %subscription_id,
                reason,
                "notification: subscription cancelled"
            ),
        }
        Ok(())
    }
}
