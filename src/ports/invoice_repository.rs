//! Invoice persistence and the invoice number sequence.

use async_trait::async_trait;

use crate::domain::foundation::{AccountId, BillingError, InvoiceId, SubscriptionId, Timestamp};
use crate::domain::invoice::Invoice;

#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    async fn find(&self, id: InvoiceId) -> Result<Option<Invoice>, BillingError>;

    async fn save(&self, invoice: &Invoice) -> Result<(), BillingError>;

    /// Claims the next value of the gapless invoice number sequence.
    async fn next_invoice_number(&self) -> Result<u64, BillingError>;

    /// The non-void invoice already generated for a subscription period,
    /// if one exists. The boundary sweep uses this to stay idempotent.
    async fn find_period_invoice(
        &self,
        subscription_id: SubscriptionId,
        period_start: Timestamp,
    ) -> Result<Option<Invoice>, BillingError>;

    /// Open invoices whose due date is before `now`, oldest first.
    async fn list_open_past_due(&self, now: Timestamp) -> Result<Vec<Invoice>, BillingError>;

    /// Open invoices for one account, oldest due date first.
    async fn list_open_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Invoice>, BillingError>;

    async fn list_for_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Vec<Invoice>, BillingError>;
}
