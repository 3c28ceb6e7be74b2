//! Outbound customer notifications.
//!
//! Delivery is best-effort: handlers log a failed send and carry on, a
//! notification never fails a billing operation.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::foundation::{AccountId, InvoiceId, Money, SubscriptionId, Timestamp};
use crate::domain::invoice::InvoiceNumber;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    InvoiceFinalized {
        account_id: AccountId,
        invoice_id: InvoiceId,
        number: InvoiceNumber,
        amount_due: Money,
        due_at: Timestamp,
    },
    PaymentSucceeded {
        account_id: AccountId,
        invoice_id: InvoiceId,
        amount: Money,
    },
    PaymentFailed {
        account_id: AccountId,
        invoice_id: InvoiceId,
        reason: String,
        next_retry_at: Option<Timestamp>,
    },
    AccountWarned {
        account_id: AccountId,
        invoice_id: InvoiceId,
    },
    AccountBlocked {
        account_id: AccountId,
        invoice_id: InvoiceId,
    },
    SubscriptionExpired {
        account_id: AccountId,
        subscription_id: SubscriptionId,
    },
    /// Sent only for automatic cancellations (pause past the cap), not
    /// for customer-initiated ones.
    SubscriptionCancelled {
        account_id: AccountId,
        subscription_id: SubscriptionId,
        reason: String,
    },
}

#[derive(Debug, Clone, Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}
