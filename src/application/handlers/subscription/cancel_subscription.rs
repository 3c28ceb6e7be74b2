//! Cancelling a subscription, immediately or at the period boundary.

use std::sync::Arc;
use tracing::info;

use crate::domain::foundation::{BillingError, ErrorCode, SubscriptionId};
use crate::domain::subscription::{HistoryRecord, Subscription};
use crate::ports::{Clock, EntityLock, HistoryStore, LockScope, SubscriptionRepository};

pub struct CancelSubscription {
    subscriptions: Arc<dyn SubscriptionRepository>,
    history: Arc<dyn HistoryStore>,
    locks: Arc<dyn EntityLock>,
    clock: Arc<dyn Clock>,
}

impl CancelSubscription {
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

    /// Immediate cancellation ends service now with no refund for the
    /// unused remainder; otherwise billing runs until the boundary.
    pub async fn execute(
        &self,
        subscription_id: SubscriptionId,
        immediate: bool,
    ) -> Result<Subscription, BillingError> {
        let _lease = self
            .locks
            .acquire(LockScope::Subscription(subscription_id))
            .await?;
        let now = self.clock.now();

        let mut sub = self
            .subscriptions
            .find(subscription_id)
            .await?
            .ok_or_else(|| {
                BillingError::not_found(ErrorCode::SubscriptionNotFound, subscription_id)
            })?;

        let event = if immediate {
            sub.cancel_now(now)?
        } else {
            sub.schedule_cancel(now)?
        };
        self.subscriptions.save(&sub).await?;
        self.history
            .append(HistoryRecord::new(event, &sub, now))
            .await?;

        info!(
            subscription_id = %sub.id(),
            immediate,
            "subscription cancellation requested"
        );
        Ok(sub)
    }
}
