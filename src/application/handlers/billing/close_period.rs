//! Period-boundary processing.
//!
//! Closes a subscription's current period: bills the period's usage,
//! applies any queued plan change, charges the renewal for the new period
//! (or finalizes a scheduled cancellation), and rolls the period clock.
//! Re-running after a partial failure is safe; the period invoice is the
//! idempotency anchor.

use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::foundation::{BillingError, ErrorCode, Money, SubscriptionId, Timestamp};
use crate::domain::invoice::{Invoice, LineItem, LineItemKind};
use crate::domain::plan::PlanVersion;
use crate::domain::subscription::{HistoryRecord, Subscription};
use crate::domain::usage::tiered_charge_cents;
use crate::ports::{
    BillingProfile, BillingProfiles, Clock, EntityLock, HistoryStore, InvoiceRepository,
    LockScope, Notification, Notifier, PlanRepository, SubscriptionRepository, UsageStore,
};

use super::assembler::InvoiceAssembler;

pub struct ClosePeriod {
    subscriptions: Arc<dyn SubscriptionRepository>,
    plans: Arc<dyn PlanRepository>,
    invoices: Arc<dyn InvoiceRepository>,
    usage: Arc<dyn UsageStore>,
    profiles: Arc<dyn BillingProfiles>,
    history: Arc<dyn HistoryStore>,
    locks: Arc<dyn EntityLock>,
    notifier: Arc<dyn Notifier>,
    assembler: Arc<InvoiceAssembler>,
    clock: Arc<dyn Clock>,
}

impl ClosePeriod {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        plans: Arc<dyn PlanRepository>,
        invoices: Arc<dyn InvoiceRepository>,
        usage: Arc<dyn UsageStore>,
        profiles: Arc<dyn BillingProfiles>,
        history: Arc<dyn HistoryStore>,
        locks: Arc<dyn EntityLock>,
        notifier: Arc<dyn Notifier>,
        assembler: Arc<InvoiceAssembler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            subscriptions,
            plans,
            invoices,
            usage,
            profiles,
            history,
            locks,
            notifier,
            assembler,
            clock,
        }
    }

    /// Processes one subscription's boundary if it has been reached.
    /// Returns the invoice generated for the closing period, if any.
    pub async fn execute(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Option<Invoice>, BillingError> {
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
        if !sub.is_due_for_close(now) {
            return Ok(None);
        }

        let profile = self
            .profiles
            .find(sub.account_id())
            .await?
            .ok_or_else(|| BillingError::not_found(ErrorCode::AccountNotFound, sub.account_id()))?;
        let current_plan = self.plans.find(sub.plan_version()).await?.ok_or_else(|| {
            BillingError::not_found(ErrorCode::PlanNotFound, sub.plan_version())
        })?;

        let period_start = sub.period_start();
        let period_end = sub.period_end();

        let invoice = if sub.cancel_at_period_end() {
            let invoice = self
                .final_usage_invoice(&sub, &current_plan, &profile, period_start, period_end, now)
                .await?;
            let event = sub.finalize_cancellation(now)?;
            self.subscriptions.save(&sub).await?;
            self.history
                .append(HistoryRecord::new(event, &sub, now))
                .await?;
            info!(subscription_id = %sub.id(), "subscription cancelled at period end");
            invoice
        } else {
            self.renew(&mut sub, &current_plan, &profile, period_start, period_end, now)
                .await?
        };

        if let Some(ref invoice) = invoice {
            if let Some(number) = invoice.number() {
                let notification = Notification::InvoiceFinalized {
                    account_id: invoice.account_id(),
                    invoice_id: invoice.id(),
                    number,
                    amount_due: invoice.amount_due(),
                    due_at: invoice.due_at().unwrap_or(now),
                };
                if let Err(err) = self.notifier.notify(notification).await {
                    warn!(invoice_id = %invoice.id(), %err, "invoice notification failed");
                }
            }
        }
        Ok(invoice)
    }

    /// Usage-only invoice for the last period of a cancelling
    /// subscription. No usage means no invoice.
    async fn final_usage_invoice(
        &self,
        sub: &Subscription,
        plan: &PlanVersion,
        profile: &BillingProfile,
        period_start: Timestamp,
        period_end: Timestamp,
        now: Timestamp,
    ) -> Result<Option<Invoice>, BillingError> {
        if let Some(existing) = self
            .invoices
            .find_period_invoice(sub.id(), period_start)
            .await?
        {
            return Ok(Some(existing));
        }

        let mut invoice = Invoice::draft(
            sub.account_id(),
            sub.id(),
            plan.recurring_price().currency(),
            period_start,
            period_end,
            now,
        );
        let had_usage = self
            .push_usage_lines(&mut invoice, sub, plan, period_start, period_end)
            .await?;
        if !had_usage {
            return Ok(None);
        }

        self.assembler.finalize(&mut invoice, profile, now).await?;
        self.assembler.settle_if_zero_due(&mut invoice, now).await?;
        Ok(Some(invoice))
    }

    /// The plain renewal path: usage for the closing period plus the
    /// recurring charge for the period being opened, priced on the plan
    /// in effect after any queued change.
    async fn renew(
        &self,
        sub: &mut Subscription,
        current_plan: &PlanVersion,
        profile: &BillingProfile,
        period_start: Timestamp,
        period_end: Timestamp,
        now: Timestamp,
    ) -> Result<Option<Invoice>, BillingError> {
        let renewal_plan = match sub.pending_change() {
            Some(pending) => self.plans.find(pending.target).await?.ok_or_else(|| {
                BillingError::not_found(ErrorCode::PlanNotFound, pending.target)
            })?,
            None => current_plan.clone(),
        };

        let invoice = match self
            .invoices
            .find_period_invoice(sub.id(), period_start)
            .await?
        {
            Some(existing) => existing,
            None => {
                let mut invoice = Invoice::draft(
                    sub.account_id(),
                    sub.id(),
                    renewal_plan.recurring_price().currency(),
                    period_start,
                    period_end,
                    now,
                );
                // Usage bills at the plan that governed the closing period.
                self.push_usage_lines(&mut invoice, sub, current_plan, period_start, period_end)
                    .await?;
                let quantity = sub
                    .pending_change()
                    .map(|pending| pending.quantity)
                    .unwrap_or_else(|| sub.quantity());
                let description = if quantity == 1 {
                    format!("{} plan", renewal_plan.name())
                } else {
                    format!("{} plan x {}", renewal_plan.name(), quantity)
                };
                invoice.push_line(LineItem::new(
                    LineItemKind::RecurringCharge,
                    description,
                    renewal_plan.recurring_price().scaled_by(quantity as i64),
                ))?;
                self.assembler.finalize(&mut invoice, profile, now).await?;
                self.assembler.settle_if_zero_due(&mut invoice, now).await?;
                invoice
            }
        };

        if let Some(change_event) = sub.apply_pending_change(now) {
            self.history
                .append(HistoryRecord::new(change_event, sub, now))
                .await?;
        }
        let next_end = renewal_plan.interval().advance(period_end);
        let closed_event = sub.roll_period(next_end, now)?;
        self.subscriptions.save(sub).await?;
        self.history
            .append(HistoryRecord::new(closed_event, sub, now))
            .await?;

        info!(
            subscription_id = %sub.id(),
            invoice_id = %invoice.id(),
            period_start = %period_start,
            period_end = %period_end,
            "billing period closed"
        );
        Ok(Some(invoice))
    }

    /// Appends one usage line per metered metric with nonzero quantity.
    /// Returns whether anything was billed.
    async fn push_usage_lines(
        &self,
        invoice: &mut Invoice,
        sub: &Subscription,
        plan: &PlanVersion,
        period_start: Timestamp,
        period_end: Timestamp,
    ) -> Result<bool, BillingError> {
        let mut any = false;
        for component in plan.metered() {
            let quantity = self
                .usage
                .quantity_for_period(sub.id(), &component.metric, period_start, period_end)
                .await?;
            if quantity == 0 {
                continue;
            }
            let cents = tiered_charge_cents(&component.schedule, quantity)?;
            invoice.push_line(LineItem::new(
                LineItemKind::Usage {
                    metric: component.metric.clone(),
                },
                format!("{} ({} units)", component.metric, quantity),
                Money::from_cents(cents, invoice.currency()),
            ))?;
            any = true;
        }
        Ok(any)
    }
}
