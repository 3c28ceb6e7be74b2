//! Append-only subscription history storage.

use async_trait::async_trait;

use crate::domain::foundation::{BillingError, SubscriptionId};
use crate::domain::subscription::HistoryRecord;

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, record: HistoryRecord) -> Result<(), BillingError>;

    /// All records for a subscription in append order.
    async fn list_for(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Vec<HistoryRecord>, BillingError>;
}
