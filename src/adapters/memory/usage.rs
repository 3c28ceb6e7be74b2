//! In-memory usage store with idempotent ingestion.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::foundation::{BillingError, IdempotencyKey, SubscriptionId, Timestamp};
use crate::domain::usage::UsageRecord;
use crate::ports::{IngestOutcome, UsageStore};

#[derive(Default)]
pub struct InMemoryUsageStore {
    by_key: Mutex<HashMap<IdempotencyKey, UsageRecord>>,
}

impl InMemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, HashMap<IdempotencyKey, UsageRecord>> {
        self.by_key.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sum<F>(&self, filter: F) -> u64
    where
        F: Fn(&UsageRecord) -> bool,
    {
        self.guard()
            .values()
            .filter(|r| filter(r))
            .map(|r| r.quantity())
            .sum()
    }
}

fn in_period(record: &UsageRecord, start: Timestamp, end: Timestamp) -> bool {
    !record.occurred_at().is_before(&start) && record.occurred_at().is_before(&end)
}

#[async_trait]
impl UsageStore for InMemoryUsageStore {
    async fn insert(&self, record: UsageRecord) -> Result<IngestOutcome, BillingError> {
        let mut rows = self.guard();
        if let Some(existing) = rows.get(record.idempotency_key()) {
            if existing.same_parameters(
                record.subscription_id(),
                record.metric(),
                record.quantity(),
                record.occurred_at(),
            ) {
                return Ok(IngestOutcome::Duplicate(existing.clone()));
            }
            return Err(BillingError::idempotency_conflict(record.idempotency_key()));
        }
        rows.insert(record.idempotency_key().clone(), record.clone());
        Ok(IngestOutcome::Recorded(record))
    }

    async fn quantity_for_period(
        &self,
        subscription_id: SubscriptionId,
        metric: &str,
        period_start: Timestamp,
        period_end: Timestamp,
    ) -> Result<u64, BillingError> {
        Ok(self.sum(|r| {
            r.subscription_id() == subscription_id
                && r.metric() == metric
                && in_period(r, period_start, period_end)
        }))
    }
}
