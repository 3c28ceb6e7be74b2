//! Resuming a paused subscription.

use std::sync::Arc;
use tracing::info;

use crate::domain::foundation::{BillingError, ErrorCode, SubscriptionId};
use crate::domain::subscription::{HistoryRecord, Subscription};
use crate::ports::{
    Clock, EntityLock, HistoryStore, LockScope, PlanRepository, SubscriptionRepository,
};

pub struct ResumeSubscription {
    subscriptions: Arc<dyn SubscriptionRepository>,
    plans: Arc<dyn PlanRepository>,
    history: Arc<dyn HistoryStore>,
    locks: Arc<dyn EntityLock>,
    clock: Arc<dyn Clock>,
}

impl ResumeSubscription {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        plans: Arc<dyn PlanRepository>,
        history: Arc<dyn HistoryStore>,
        locks: Arc<dyn EntityLock>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            subscriptions,
            plans,
            history,
            locks,
            clock,
        }
    }

    /// Resumes a paused subscription with a fresh full period starting
    /// now. The renewal invoice for it arrives at the next boundary.
    pub async fn execute(
        &self,
        subscription_id: SubscriptionId,
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
        let plan = self
            .plans
            .find(sub.plan_version())
            .await?
            .ok_or_else(|| BillingError::not_found(ErrorCode::PlanNotFound, sub.plan_version()))?;

        let event = sub.resume(plan.interval().advance(now), now)?;
        self.subscriptions.save(&sub).await?;
        self.history
            .append(HistoryRecord::new(event, &sub, now))
            .await?;

        info!(
            subscription_id = %sub.id(),
            period_end = %sub.period_end(),
            "subscription resumed"
        );
        Ok(sub)
    }
}
