//! Plan and quantity changes.
//!
//! An immediate change repoints the subscription now and invoices the
//! proration pair: a credit for the unused remainder of the old price
//! (plan price times quantity) and a charge for the same remainder on
//! the new one, both floored. A deferred change queues until the
//! boundary (last write wins).

use std::sync::Arc;
use tracing::info;

use crate::domain::foundation::{
    BillingError, ErrorCode, Money, PlanVersionId, SubscriptionId,
};
use crate::domain::invoice::{proration_pair, Invoice, LineItem, LineItemKind};
use crate::domain::subscription::{HistoryRecord, Subscription};
use crate::ports::{
    BillingProfiles, Clock, EntityLock, HistoryStore, LockScope, PlanRepository,
    SubscriptionRepository,
};

use crate::application::handlers::billing::InvoiceAssembler;

pub struct ChangePlan {
    subscriptions: Arc<dyn SubscriptionRepository>,
    plans: Arc<dyn PlanRepository>,
    profiles: Arc<dyn BillingProfiles>,
    history: Arc<dyn HistoryStore>,
    locks: Arc<dyn EntityLock>,
    assembler: Arc<InvoiceAssembler>,
    clock: Arc<dyn Clock>,
}

/// What a plan change produced.
#[derive(Debug)]
pub struct PlanChangeOutcome {
    pub subscription: Subscription,
    /// The proration invoice, present only for immediate changes with a
    /// nonzero credit or charge.
    pub invoice: Option<Invoice>,
}

impl ChangePlan {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        plans: Arc<dyn PlanRepository>,
        profiles: Arc<dyn BillingProfiles>,
        history: Arc<dyn HistoryStore>,
        locks: Arc<dyn EntityLock>,
        assembler: Arc<InvoiceAssembler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            subscriptions,
            plans,
            profiles,
            history,
            locks,
            assembler,
            clock,
        }
    }

    pub async fn execute(
        &self,
        subscription_id: SubscriptionId,
        target_plan_id: PlanVersionId,
        quantity: u32,
        immediate: bool,
    ) -> Result<PlanChangeOutcome, BillingError> {
        let _lease = self
            .locks
            .acquire(LockScope::Subscription(subscription_id))
            .await?;
        let now = self.clock.now();

        if quantity < 1 {
            return Err(BillingError::validation("quantity", "must be at least 1"));
        }

        let mut sub = self
            .subscriptions
            .find(subscription_id)
            .await?
            .ok_or_else(|| {
                BillingError::not_found(ErrorCode::SubscriptionNotFound, subscription_id)
            })?;
        let current = self
            .plans
            .find(sub.plan_version())
            .await?
            .ok_or_else(|| BillingError::not_found(ErrorCode::PlanNotFound, sub.plan_version()))?;
        let target = self
            .plans
            .find(target_plan_id)
            .await?
            .ok_or_else(|| BillingError::not_found(ErrorCode::PlanNotFound, target_plan_id))?;

        if target.id() == current.id() && quantity == sub.quantity() {
            return Err(BillingError::conflict(
                "subscription is already on this plan at this quantity",
            ));
        }
        if target.recurring_price().currency() != current.recurring_price().currency() {
            return Err(BillingError::validation(
                "target_plan",
                "plan changes cannot cross currencies",
            ));
        }

        if !immediate {
            let event = sub.schedule_plan_change(target.id(), quantity, now)?;
            self.subscriptions.save(&sub).await?;
            self.history
                .append(HistoryRecord::new(event, &sub, now))
                .await?;
            info!(
                subscription_id = %sub.id(),
                target_plan = target.name(),
                "plan change scheduled for next boundary"
            );
            return Ok(PlanChangeOutcome {
                subscription: sub,
                invoice: None,
            });
        }

        // Nothing was paid for a trial, so a trial change has no proration.
        let invoice = if sub.is_in_trial() {
            None
        } else {
            let remaining = sub.days_remaining(now);
            let total = sub.period_days();
            let (credit_cents, charge_cents) = proration_pair(
                current.recurring_price().scaled_by(sub.quantity() as i64).cents(),
                target.recurring_price().scaled_by(quantity as i64).cents(),
                remaining,
                total,
            );
            if credit_cents == 0 && charge_cents == 0 {
                None
            } else {
                let currency = current.recurring_price().currency();
                let profile = self.profiles.find(sub.account_id()).await?.ok_or_else(|| {
                    BillingError::not_found(ErrorCode::AccountNotFound, sub.account_id())
                })?;
                let mut invoice = Invoice::draft(
                    sub.account_id(),
                    sub.id(),
                    currency,
                    now,
                    sub.period_end(),
                    now,
                );
                if credit_cents > 0 {
                    invoice.push_line(LineItem::new(
                        LineItemKind::ProrationCredit,
                        format!("Unused time on {}", current.name()),
                        Money::from_cents(-credit_cents, currency),
                    ))?;
                }
                if charge_cents > 0 {
                    invoice.push_line(LineItem::new(
                        LineItemKind::ProrationCharge,
                        format!("Remaining time on {}", target.name()),
                        Money::from_cents(charge_cents, currency),
                    ))?;
                }
                self.assembler.finalize(&mut invoice, &profile, now).await?;
                self.assembler.settle_if_zero_due(&mut invoice, now).await?;
                Some(invoice)
            }
        };

        let event = sub.change_plan_now(target.id(), quantity, now)?;
        self.subscriptions.save(&sub).await?;
        self.history
            .append(HistoryRecord::new(event, &sub, now))
            .await?;

        info!(
            subscription_id = %sub.id(),
            from = current.name(),
            to = target.name(),
            invoiced = invoice.is_some(),
            "plan changed immediately"
        );
        Ok(PlanChangeOutcome {
            subscription: sub,
            invoice,
        })
    }
}
