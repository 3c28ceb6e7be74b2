//! Creating a subscription.

use std::sync::Arc;
use tracing::info;

use crate::domain::foundation::{AccountId, BillingError, ErrorCode, PlanVersionId, StateMachine};
use crate::domain::subscription::{HistoryRecord, Subscription};
use crate::ports::{
    BillingProfiles, Clock, DunningLedger, HistoryStore, PlanRepository, SubscriptionRepository,
};

pub struct CreateSubscription {
    subscriptions: Arc<dyn SubscriptionRepository>,
    plans: Arc<dyn PlanRepository>,
    profiles: Arc<dyn BillingProfiles>,
    dunning: Arc<dyn DunningLedger>,
    history: Arc<dyn HistoryStore>,
    clock: Arc<dyn Clock>,
}

impl CreateSubscription {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        plans: Arc<dyn PlanRepository>,
        profiles: Arc<dyn BillingProfiles>,
        dunning: Arc<dyn DunningLedger>,
        history: Arc<dyn HistoryStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            subscriptions,
            plans,
            profiles,
            dunning,
            history,
            clock,
        }
    }

    /// Starts a subscription for the account on the given plan version.
    ///
    /// Blocked accounts and accounts that already hold a live subscription
    /// in the same plan family are refused.
    pub async fn execute(
        &self,
        account_id: AccountId,
        plan_version_id: PlanVersionId,
        quantity: u32,
    ) -> Result<Subscription, BillingError> {
        let now = self.clock.now();

        if quantity < 1 {
            return Err(BillingError::validation("quantity", "must be at least 1"));
        }
        if self.profiles.find(account_id).await?.is_none() {
            return Err(BillingError::not_found(ErrorCode::AccountNotFound, account_id));
        }
        if self.dunning.level_for(account_id).await?.is_blocked() {
            return Err(BillingError::new(
                ErrorCode::PaymentRequired,
                "account is blocked for unpaid invoices",
            )
            .with_remediation("settle the outstanding invoices"));
        }

        let plan = self
            .plans
            .find(plan_version_id)
            .await?
            .ok_or_else(|| BillingError::not_found(ErrorCode::PlanNotFound, plan_version_id))?;

        let existing = self.subscriptions.list_by_account(account_id).await?;
        for sub in &existing {
            if sub.status().is_terminal() {
                continue;
            }
            let other_plan = self.plans.find(sub.plan_version()).await?;
            if other_plan.map(|p| p.family()) == Some(plan.family()) {
                return Err(BillingError::new(
                    ErrorCode::DuplicateSubscription,
                    "account already has a live subscription to this plan",
                )
                .with_detail("subscription_id", sub.id().to_string()));
            }
        }

        let (subscription, event) = Subscription::create(account_id, &plan, quantity, now);
        self.subscriptions.save(&subscription).await?;
        self.history
            .append(HistoryRecord::new(event, &subscription, now))
            .await?;

        info!(
            subscription_id = %subscription.id(),
            account_id = %account_id,
            plan = plan.name(),
            quantity,
            status = subscription.status().as_str(),
            "subscription created"
        );
        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryBillingProfiles, InMemoryDunningLedger, InMemoryHistoryStore,
        InMemoryPlanRepository, InMemorySubscriptionRepository, ManualClock,
    };
    use crate::domain::foundation::{Currency, Money, Timestamp};
    use crate::domain::payment::DunningLevel;
    use crate::domain::plan::{BillingInterval, PlanVersion};
    use crate::domain::subscription::SubscriptionStatus;
    use crate::ports::BillingProfile;

    struct Fixture {
        handler: CreateSubscription,
        plans: Arc<InMemoryPlanRepository>,
        dunning: Arc<InMemoryDunningLedger>,
        history: Arc<InMemoryHistoryStore>,
        account_id: AccountId,
    }

    async fn fixture() -> Fixture {
        let subscriptions = Arc::new(InMemorySubscriptionRepository::new());
        let plans = Arc::new(InMemoryPlanRepository::new());
        let profiles = Arc::new(InMemoryBillingProfiles::new());
        let dunning = Arc::new(InMemoryDunningLedger::new());
        let history = Arc::new(InMemoryHistoryStore::new());
        let account_id = AccountId::new();
        profiles
            .save(&BillingProfile {
                account_id,
                jurisdiction: "US-NY".into(),
                tax_exempt: false,
                vat_id: None,
                payment_method: Some("pm_test".into()),
            })
            .await
            .unwrap();
        let handler = CreateSubscription::new(
            subscriptions,
            plans.clone(),
            profiles,
            dunning.clone(),
            history.clone(),
            Arc::new(ManualClock::at(Timestamp::now())),
        );
        Fixture {
            handler,
            plans,
            dunning,
            history,
            account_id,
        }
    }

    async fn seed_plan(plans: &InMemoryPlanRepository, trial_days: u32) -> PlanVersion {
        let plan = PlanVersion::create(
            "Pro",
            BillingInterval::Monthly,
            Money::from_cents(4900, Currency::usd()),
            trial_days,
            vec![],
            Timestamp::now(),
        )
        .unwrap();
        plans.save(&plan).await.unwrap();
        plan
    }

    #[tokio::test]
    async fn creates_trial_subscription_and_history() {
        let f = fixture().await;
        let plan = seed_plan(&f.plans, 14).await;

        let sub = f.handler.execute(f.account_id, plan.id(), 1).await.unwrap();
        assert_eq!(sub.status(), SubscriptionStatus::Trial);

        let records = f.history.list_for(sub.id()).await.unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn blocked_account_is_refused() {
        let f = fixture().await;
        let plan = seed_plan(&f.plans, 0).await;
        f.dunning
            .set_level(f.account_id, DunningLevel::Blocked, Timestamp::now())
            .await
            .unwrap();

        let err = f.handler.execute(f.account_id, plan.id(), 1).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::PaymentRequired);
        assert!(err.remediation.is_some());
    }

    #[tokio::test]
    async fn duplicate_family_subscription_is_refused() {
        let f = fixture().await;
        let plan = seed_plan(&f.plans, 0).await;
        f.handler.execute(f.account_id, plan.id(), 1).await.unwrap();

        // Even a newer version of the same family counts as a duplicate.
        let v2 = plan
            .supersede(
                Money::from_cents(5900, Currency::usd()),
                vec![],
                Timestamp::now(),
            )
            .unwrap();
        f.plans.save(&v2).await.unwrap();

        let err = f.handler.execute(f.account_id, v2.id(), 1).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::DuplicateSubscription);
    }

    #[tokio::test]
    async fn zero_quantity_is_rejected() {
        let f = fixture().await;
        let plan = seed_plan(&f.plans, 0).await;
        let err = f.handler.execute(f.account_id, plan.id(), 0).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
    }

    #[tokio::test]
    async fn unknown_plan_is_rejected() {
        let f = fixture().await;
        let err = f
            .handler
            .execute(f.account_id, PlanVersionId::new(), 1)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::PlanNotFound);
    }
}
