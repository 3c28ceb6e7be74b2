//! Usage record storage with idempotent ingestion.

use async_trait::async_trait;

use crate::domain::foundation::{BillingError, SubscriptionId, Timestamp};
use crate::domain::usage::UsageRecord;

/// Result of an insert attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Recorded(UsageRecord),
    /// The key was already used with identical parameters; the original
    /// record is returned and nothing was written.
    Duplicate(UsageRecord),
}

#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Inserts a record unless its idempotency key was already used.
    ///
    /// # Errors
    ///
    /// `IdempotencyConflict` when the key exists with different parameters.
    async fn insert(&self, record: UsageRecord) -> Result<IngestOutcome, BillingError>;

    /// Total quantity for a metric with `occurred_at` in
    /// `[period_start, period_end)`.
    async fn quantity_for_period(
        &self,
        subscription_id: SubscriptionId,
        metric: &str,
        period_start: Timestamp,
        period_end: Timestamp,
    ) -> Result<u64, BillingError>;
}
