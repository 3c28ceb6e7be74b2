//! Usage ingestion.
//!
//! Ingestion is idempotent on the caller's key. Usage for the current
//! period just accumulates; usage for the most recently closed period is
//! accepted during the grace window and billed marginally on a
//! supplemental invoice, so the combined charge equals what a timely
//! ingestion would have produced.

use std::sync::Arc;
use tracing::info;

use crate::domain::foundation::{
    BillingError, ErrorCode, IdempotencyKey, Money, SubscriptionId, Timestamp,
};
use crate::domain::invoice::{Invoice, LineItem, LineItemKind};
use crate::domain::subscription::SubscriptionStatus;
use crate::domain::usage::{marginal_charge_cents, tiered_charge_cents, UsageRecord};
use crate::ports::{
    BillingProfiles, Clock, EntityLock, IngestOutcome, LockScope, PlanRepository,
    SubscriptionRepository, UsageStore,
};

use crate::application::handlers::billing::InvoiceAssembler;

pub struct IngestUsage {
    subscriptions: Arc<dyn SubscriptionRepository>,
    plans: Arc<dyn PlanRepository>,
    usage: Arc<dyn UsageStore>,
    profiles: Arc<dyn BillingProfiles>,
    locks: Arc<dyn EntityLock>,
    assembler: Arc<InvoiceAssembler>,
    clock: Arc<dyn Clock>,
    grace_days: u32,
}

/// What an ingestion produced.
#[derive(Debug)]
pub struct IngestResult {
    pub record: UsageRecord,
    pub duplicate: bool,
    /// Present when late usage was billed against a closed period.
    pub supplemental_invoice: Option<Invoice>,
}

impl IngestUsage {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        plans: Arc<dyn PlanRepository>,
        usage: Arc<dyn UsageStore>,
        profiles: Arc<dyn BillingProfiles>,
        locks: Arc<dyn EntityLock>,
        assembler: Arc<InvoiceAssembler>,
        clock: Arc<dyn Clock>,
        grace_days: u32,
    ) -> Self {
        Self {
            subscriptions,
            plans,
            usage,
            profiles,
            locks,
            assembler,
            clock,
            grace_days,
        }
    }

    pub async fn execute(
        &self,
        subscription_id: SubscriptionId,
        metric: &str,
        quantity: u64,
        occurred_at: Timestamp,
        key: IdempotencyKey,
    ) -> Result<IngestResult, BillingError> {
        let _lease = self
            .locks
            .acquire(LockScope::Subscription(subscription_id))
            .await?;
        let now = self.clock.now();

        let sub = self
            .subscriptions
            .find(subscription_id)
            .await?
            .ok_or_else(|| {
                BillingError::not_found(ErrorCode::SubscriptionNotFound, subscription_id)
            })?;
        match sub.status() {
            SubscriptionStatus::Trial | SubscriptionStatus::Active => {}
            SubscriptionStatus::Paused => {
                return Err(BillingError::conflict(
                    "usage is not accepted while the subscription is paused",
                )
                .with_remediation("resume the subscription first"));
            }
            SubscriptionStatus::Cancelled | SubscriptionStatus::Expired => {
                return Err(BillingError::conflict(format!(
                    "usage is not accepted on a {} subscription",
                    sub.status().as_str()
                )));
            }
        }

        let plan = self
            .plans
            .find(sub.plan_version())
            .await?
            .ok_or_else(|| BillingError::not_found(ErrorCode::PlanNotFound, sub.plan_version()))?;
        let schedule = plan.schedule_for(metric).ok_or_else(|| {
            BillingError::validation(
                "metric",
                format!("plan {} does not meter '{}'", plan.name(), metric),
            )
        })?;

        if occurred_at.is_after(&now) {
            return Err(BillingError::validation(
                "occurred_at",
                "usage cannot occur in the future",
            ));
        }

        let in_current = !occurred_at.is_before(&sub.period_start())
            && occurred_at.is_before(&sub.period_end());
        let late_period = if in_current {
            None
        } else {
            match sub.last_closed() {
                Some(closed) if closed.contains(occurred_at) => {
                    if !closed.within_grace(now, self.grace_days) {
                        return Err(BillingError::conflict(format!(
                            "the {}-day grace window for that period has elapsed",
                            self.grace_days
                        ))
                        .with_remediation("request a manual billing adjustment"));
                    }
                    Some(closed)
                }
                _ => {
                    return Err(BillingError::validation(
                        "occurred_at",
                        "usage falls outside the current and grace-window periods",
                    ));
                }
            }
        };

        // Validate capacity before writing anything: a Reject-overflow
        // schedule refuses quantity it could never bill.
        let (window_start, window_end) = match late_period {
            Some(closed) => (closed.start, closed.end),
            None => (sub.period_start(), sub.period_end()),
        };
        let prior_quantity = self
            .usage
            .quantity_for_period(sub.id(), metric, window_start, window_end)
            .await?;
        tiered_charge_cents(schedule, prior_quantity + quantity)?;

        let record = UsageRecord::new(sub.id(), metric, quantity, occurred_at, key, now)?;
        let record = match self.usage.insert(record).await? {
            IngestOutcome::Recorded(record) => record,
            IngestOutcome::Duplicate(original) => {
                return Ok(IngestResult {
                    record: original,
                    duplicate: true,
                    supplemental_invoice: None,
                });
            }
        };

        let supplemental_invoice = match late_period {
            Some(closed) => {
                let cents = marginal_charge_cents(schedule, prior_quantity, quantity)?;
                if cents > 0 {
                    let profile =
                        self.profiles.find(sub.account_id()).await?.ok_or_else(|| {
                            BillingError::not_found(ErrorCode::AccountNotFound, sub.account_id())
                        })?;
                    let currency = plan.recurring_price().currency();
                    let mut invoice = Invoice::draft_supplemental(
                        sub.account_id(),
                        sub.id(),
                        currency,
                        closed.start,
                        closed.end,
                        now,
                    );
                    invoice.push_line(LineItem::new(
                        LineItemKind::Usage {
                            metric: metric.to_string(),
                        },
                        format!("{} ({} units, late)", metric, quantity),
                        Money::from_cents(cents, currency),
                    ))?;
                    self.assembler.finalize(&mut invoice, &profile, now).await?;
                    self.assembler.settle_if_zero_due(&mut invoice, now).await?;
                    info!(
                        subscription_id = %sub.id(),
                        invoice_id = %invoice.id(),
                        metric,
                        quantity,
                        "late usage billed on supplemental invoice"
                    );
                    Some(invoice)
                } else {
                    None
                }
            }
            None => None,
        };

        Ok(IngestResult {
            record,
            duplicate: false,
            supplemental_invoice,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        FlatRateTaxService, InMemoryBillingProfiles, InMemoryCreditRepository,
        InMemoryEntityLock, InMemoryInvoiceRepository, InMemoryPaymentAttemptRepository,
        InMemoryPlanRepository, InMemorySubscriptionRepository, InMemoryUsageStore, ManualClock,
    };
    use crate::domain::foundation::{AccountId, Currency};
    use crate::domain::plan::{
        BillingInterval, MeteredComponent, PlanVersion, TierOverflow, TierSchedule, UsageTier,
    };
    use crate::domain::subscription::Subscription;
    use crate::ports::BillingProfile;

    struct Fixture {
        handler: IngestUsage,
        subscriptions: Arc<InMemorySubscriptionRepository>,
        clock: Arc<ManualClock>,
        sub: Subscription,
    }

    async fn fixture() -> Fixture {
        let subscriptions = Arc::new(InMemorySubscriptionRepository::new());
        let plans = Arc::new(InMemoryPlanRepository::new());
        let usage = Arc::new(InMemoryUsageStore::new());
        let profiles = Arc::new(InMemoryBillingProfiles::new());
        let invoices = Arc::new(InMemoryInvoiceRepository::new());
        let clock = Arc::new(ManualClock::at(Timestamp::from_unix_secs(1_775_001_600)));

        let schedule = TierSchedule::new(
            vec![
                UsageTier {
                    up_to: Some(1000),
                    unit_price_millicents: 0,
                },
                UsageTier {
                    up_to: Some(10_000),
                    unit_price_millicents: 1000,
                },
                UsageTier {
                    up_to: None,
                    unit_price_millicents: 500,
                },
            ],
            TierOverflow::OpenEnded,
        )
        .unwrap();
        let plan = PlanVersion::create(
            "Pro",
            BillingInterval::Monthly,
            Money::from_cents(4900, Currency::usd()),
            0,
            vec![MeteredComponent::new("api_calls", schedule).unwrap()],
            clock.now(),
        )
        .unwrap();
        plans.save(&plan).await.unwrap();

        let account_id = AccountId::new();
        profiles
            .save(&BillingProfile {
                account_id,
                jurisdiction: "US-NY".into(),
                tax_exempt: true,
                vat_id: None,
                payment_method: Some("pm_test".into()),
            })
            .await
            .unwrap();

        let (sub, _) = Subscription::create(account_id, &plan, 1, clock.now());
        subscriptions.save(&sub).await.unwrap();

        let assembler = Arc::new(InvoiceAssembler::new(
            invoices,
            Arc::new(InMemoryPaymentAttemptRepository::new()),
            Arc::new(InMemoryCreditRepository::new()),
            Arc::new(FlatRateTaxService::new(0)),
            0,
        ));
        let handler = IngestUsage::new(
            subscriptions.clone(),
            plans,
            usage,
            profiles,
            Arc::new(InMemoryEntityLock::new()),
            assembler,
            clock.clone(),
            7,
        );
        Fixture {
            handler,
            subscriptions,
            clock,
            sub,
        }
    }

    #[tokio::test]
    async fn timely_usage_records_without_invoicing() {
        let f = fixture().await;
        let result = f
            .handler
            .execute(
                f.sub.id(),
                "api_calls",
                500,
                f.clock.now(),
                IdempotencyKey::generate(),
            )
            .await
            .unwrap();
        assert!(!result.duplicate);
        assert!(result.supplemental_invoice.is_none());
    }

    #[tokio::test]
    async fn duplicate_key_is_a_noop() {
        let f = fixture().await;
        let key = IdempotencyKey::generate();
        let at = f.clock.now();
        f.handler
            .execute(f.sub.id(), "api_calls", 500, at, key.clone())
            .await
            .unwrap();
        let result = f
            .handler
            .execute(f.sub.id(), "api_calls", 500, at, key)
            .await
            .unwrap();
        assert!(result.duplicate);
    }

    #[tokio::test]
    async fn conflicting_key_is_rejected() {
        let f = fixture().await;
        let key = IdempotencyKey::generate();
        let at = f.clock.now();
        f.handler
            .execute(f.sub.id(), "api_calls", 500, at, key.clone())
            .await
            .unwrap();
        let err = f
            .handler
            .execute(f.sub.id(), "api_calls", 900, at, key)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::IdempotencyConflict);
    }

    #[tokio::test]
    async fn paused_subscription_rejects_usage() {
        let f = fixture().await;
        let mut sub = f.subscriptions.find(f.sub.id()).await.unwrap().unwrap();
        sub.pause(None, f.clock.now()).unwrap();
        f.subscriptions.save(&sub).await.unwrap();

        let err = f
            .handler
            .execute(
                f.sub.id(),
                "api_calls",
                500,
                f.clock.now(),
                IdempotencyKey::generate(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Conflict);
    }

    #[tokio::test]
    async fn unmetered_metric_is_rejected() {
        let f = fixture().await;
        let err = f
            .handler
            .execute(
                f.sub.id(),
                "storage_gb",
                5,
                f.clock.now(),
                IdempotencyKey::generate(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
    }

    #[tokio::test]
    async fn late_usage_in_grace_bills_marginally() {
        let f = fixture().await;
        let period_start = f.sub.period_start();
        let in_period = period_start.add_days(10);

        // 9,500 timely units: 8,500 billable at 1 cent.
        f.handler
            .execute(f.sub.id(), "api_calls", 9500, in_period, IdempotencyKey::generate())
            .await
            .unwrap();

        // Close the period, then deliver 3,000 more units two days later.
        let mut sub = f.subscriptions.find(f.sub.id()).await.unwrap().unwrap();
        let boundary = sub.period_end();
        sub.roll_period(boundary.add_months(1), boundary).unwrap();
        f.subscriptions.save(&sub).await.unwrap();
        f.clock.set(boundary.add_days(2));

        let result = f
            .handler
            .execute(f.sub.id(), "api_calls", 3000, in_period, IdempotencyKey::generate())
            .await
            .unwrap();

        let invoice = result.supplemental_invoice.unwrap();
        assert!(invoice.is_supplemental());
        // Marginal: 500 units at 1c + 2,500 at 0.5c = 17.50.
        assert_eq!(invoice.amount_due().cents(), 1750);
    }

    #[tokio::test]
    async fn late_usage_past_grace_is_rejected_with_remediation() {
        let f = fixture().await;
        let period_start = f.sub.period_start();
        let in_period = period_start.add_days(10);

        let mut sub = f.subscriptions.find(f.sub.id()).await.unwrap().unwrap();
        let boundary = sub.period_end();
        sub.roll_period(boundary.add_months(1), boundary).unwrap();
        f.subscriptions.save(&sub).await.unwrap();
        f.clock.set(boundary.add_days(7).add_secs(1));

        let err = f
            .handler
            .execute(f.sub.id(), "api_calls", 100, in_period, IdempotencyKey::generate())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Conflict);
        assert!(err.remediation.is_some());
    }

    #[tokio::test]
    async fn boundary_of_grace_window_is_inclusive() {
        let f = fixture().await;
        let period_start = f.sub.period_start();
        let in_period = period_start.add_days(10);

        let mut sub = f.subscriptions.find(f.sub.id()).await.unwrap().unwrap();
        let boundary = sub.period_end();
        sub.roll_period(boundary.add_months(1), boundary).unwrap();
        f.subscriptions.save(&sub).await.unwrap();
        f.clock.set(boundary.add_days(7));

        let result = f
            .handler
            .execute(f.sub.id(), "api_calls", 3000, in_period, IdempotencyKey::generate())
            .await
            .unwrap();
        assert!(!result.duplicate);
    }

    #[tokio::test]
    async fn future_usage_is_rejected() {
        let f = fixture().await;
        let err = f
            .handler
            .execute(
                f.sub.id(),
                "api_calls",
                100,
                f.clock.now().add_days(1),
                IdempotencyKey::generate(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
    }
}
