//! Payment attempt persistence.

use async_trait::async_trait;

use crate::domain::foundation::{BillingError, IdempotencyKey, InvoiceId, PaymentAttemptId};
use crate::domain::payment::PaymentAttempt;

#[async_trait]
pub trait PaymentAttemptRepository: Send + Sync {
    async fn find(&self, id: PaymentAttemptId) -> Result<Option<PaymentAttempt>, BillingError>;

    async fn save(&self, attempt: &PaymentAttempt) -> Result<(), BillingError>;

    /// The attempt already recorded under this key, if any. Collection
    /// replays its outcome instead of charging again.
    async fn find_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<PaymentAttempt>, BillingError>;

    async fn list_for_invoice(
        &self,
        invoice_id: InvoiceId,
    ) -> Result<Vec<PaymentAttempt>, BillingError>;

    /// How many attempts against this invoice have failed.
    async fn count_failed(&self, invoice_id: InvoiceId) -> Result<u32, BillingError>;

    /// Attempts flagged by a gateway timeout, awaiting reconciliation.
    async fn list_needing_reconciliation(&self) -> Result<Vec<PaymentAttempt>, BillingError>;
}
