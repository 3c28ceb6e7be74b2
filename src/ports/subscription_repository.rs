//! Subscription persistence.

use async_trait::async_trait;

use crate::domain::foundation::{AccountId, BillingError, SubscriptionId, Timestamp};
use crate::domain::subscription::Subscription;

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn find(&self, id: SubscriptionId) -> Result<Option<Subscription>, BillingError>;

    /// Inserts or updates the aggregate.
    async fn save(&self, subscription: &Subscription) -> Result<(), BillingError>;

    async fn list_by_account(&self, account_id: AccountId)
        -> Result<Vec<Subscription>, BillingError>;

    /// Billable subscriptions whose period end is at or before `now`.
    async fn list_due_for_close(&self, now: Timestamp)
        -> Result<Vec<Subscription>, BillingError>;

    /// All paused subscriptions, for the pause-expiry sweep.
    async fn list_paused(&self) -> Result<Vec<Subscription>, BillingError>;
}
