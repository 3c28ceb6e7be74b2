//! Pausing a subscription.

use std::sync::Arc;
use tracing::info;

use crate::domain::foundation::{BillingError, ErrorCode, SubscriptionId, Timestamp};
use crate::domain::subscription::{HistoryRecord, Subscription};
use crate::ports::{Clock, EntityLock, HistoryStore, LockScope, SubscriptionRepository};

pub struct PauseSubscription {
    subscriptions: Arc<dyn SubscriptionRepository>,
    history: Arc<dyn HistoryStore>,
    locks: Arc<dyn EntityLock>,
    clock: Arc<dyn Clock>,
}

impl PauseSubscription {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        history: Arc<dyn HistoryStore>,
        locks: Arc<dyn EntityLock>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            subscriptions,
            history,
            locks,
            clock,
        }
    }

    /// Pauses an active subscription, optionally with an automatic resume
    /// time. Paused time never bills.
    pub async fn execute(
        &self,
        subscription_id: SubscriptionId,
        resumes_at: Option<Timestamp>,
    ) -> Result<Subscription, BillingError> {
        let _lease = self
            .locks
            .acquire(LockScope::Subscription(subscription_id))
            .await?;
        let now = self.clock.now();

        if let Some(at) = resumes_at {
            if !at.is_after(&now) {
                return Err(BillingError::validation(
                    "resumes_at",
                    "automatic resume time must be in the future",
                ));
            }
        }

        let mut sub = self
            .subscriptions
            .find(subscription_id)
            .await?
            .ok_or_else(|| {
                BillingError::not_found(ErrorCode::SubscriptionNotFound, subscription_id)
            })?;
        let event = sub.pause(resumes_at, now)?;
        self.subscriptions.save(&sub).await?;
        self.history
            .append(HistoryRecord::new(event, &sub, now))
            .await?;

        info!(subscription_id = %sub.id(), "subscription paused");
        Ok(sub)
    }
}
