//! Usage records.
//!
//! Each record is one idempotent ingestion of metered quantity. The key
//! makes re-delivery harmless: a duplicate with identical parameters is a
//! no-op, a duplicate with different parameters is a conflict.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    IdempotencyKey, SubscriptionId, Timestamp, UsageRecordId, ValidationError,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    id: UsageRecordId,
    subscription_id: SubscriptionId,
    metric: String,
    quantity: u64,
    occurred_at: Timestamp,
    idempotency_key: IdempotencyKey,
    recorded_at: Timestamp,
}

impl UsageRecord {
    /// Builds a validated usage record.
    ///
    /// # Errors
    ///
    /// Returns an error if the metric is empty or the quantity is zero.
    pub fn new(
        subscription_id: SubscriptionId,
        metric: impl Into<String>,
        quantity: u64,
        occurred_at: Timestamp,
        idempotency_key: IdempotencyKey,
        now: Timestamp,
    ) -> Result<Self, ValidationError> {
        let metric = metric.into();
        if metric.trim().is_empty() {
            return Err(ValidationError::empty_field("metric"));
        }
        if quantity == 0 {
            return Err(ValidationError::out_of_range("quantity", 1, i64::MAX, 0));
        }
        Ok(Self {
            id: UsageRecordId::new(),
            subscription_id,
            metric,
            quantity,
            occurred_at,
            idempotency_key,
            recorded_at: now,
        })
    }

    pub fn id(&self) -> UsageRecordId {
        self.id
    }

    pub fn subscription_id(&self) -> SubscriptionId {
        self.subscription_id
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    pub fn quantity(&self) -> u64 {
        self.quantity
    }

    pub fn occurred_at(&self) -> Timestamp {
        self.occurred_at
    }

    pub fn idempotency_key(&self) -> &IdempotencyKey {
        &self.idempotency_key
    }

    pub fn recorded_at(&self) -> Timestamp {
        self.recorded_at
    }

    /// True when another submission under the same key carries the same
    /// effective parameters, i.e. is a harmless re-delivery.
    pub fn same_parameters(
        &self,
        subscription_id: SubscriptionId,
        metric: &str,
        quantity: u64,
        occurred_at: Timestamp,
    ) -> bool {
        self.subscription_id == subscription_id
            && self.metric == metric
            && self.quantity == quantity
            && self.occurred_at == occurred_at
    }
}
