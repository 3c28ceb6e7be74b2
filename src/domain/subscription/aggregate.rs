//! The subscription aggregate.
//!
//! A subscription ties an account to one plan version and owns the billing
//! period clock. All lifecycle mutations validate against the status state
//! machine and return the event to append to the subscription's history.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    AccountId, BillingError, PlanVersionId, StateMachine, SubscriptionId, Timestamp,
};
use crate::domain::plan::PlanVersion;

use super::events::SubscriptionEvent;
use super::status::SubscriptionStatus;

/// A plan or quantity change queued to take effect at the next period
/// boundary.
///
/// Only one can be pending at a time; scheduling another replaces it
/// (last write wins), so only the final requested state is ever billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingChange {
    pub target: PlanVersionId,
    pub quantity: u32,
    pub requested_at: Timestamp,
}

/// The most recently closed billing period, kept on the aggregate so late
/// usage can be checked against the grace window without a history scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedPeriod {
    pub start: Timestamp,
    pub end: Timestamp,
    pub closed_at: Timestamp,
}

impl ClosedPeriod {
    /// True while late usage against this period is still accepted.
    /// The boundary is inclusive: exactly `grace_days` after close is in.
    pub fn within_grace(&self, now: Timestamp, grace_days: u32) -> bool {
        !now.is_after(&self.closed_at.add_days(grace_days as i64))
    }

    /// True if `at` falls inside the closed period (start inclusive,
    /// end exclusive).
    pub fn contains(&self, at: Timestamp) -> bool {
        !at.is_before(&self.start) && at.is_before(&self.end)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    id: SubscriptionId,
    account_id: AccountId,
    plan_version: PlanVersionId,
    quantity: u32,
    status: SubscriptionStatus,
    period_start: Timestamp,
    period_end: Timestamp,
    trial_end: Option<Timestamp>,
    cancel_at_period_end: bool,
    paused_at: Option<Timestamp>,
    pause_resumes_at: Option<Timestamp>,
    pending_change: Option<PendingChange>,
    last_closed: Option<ClosedPeriod>,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl Subscription {
    /// Starts a new subscription on the given plan.
    ///
    /// Plans with a trial start in `Trial` with the first period covering
    /// the trial; no invoice is due until the trial ends. Plans without a
    /// trial start in `Active` with a full billing period. The recurring
    /// charge is the plan price times `quantity`; the caller has already
    /// validated `quantity >= 1`.
    pub fn create(
        account_id: AccountId,
        plan: &PlanVersion,
        quantity: u32,
        now: Timestamp,
    ) -> (Self, SubscriptionEvent) {
        let (status, period_end, trial_end) = if plan.has_trial() {
            let end = now.add_days(plan.trial_days() as i64);
            (SubscriptionStatus::Trial, end, Some(end))
        } else {
            (SubscriptionStatus::Active, plan.interval().advance(now), None)
        };
        let subscription = Self {
            id: SubscriptionId::new(),
            account_id,
            plan_version: plan.id(),
            quantity,
            status,
            period_start: now,
            period_end,
            trial_end,
            cancel_at_period_end: false,
            paused_at: None,
            pause_resumes_at: None,
            pending_change: None,
            last_closed: None,
            created_at: now,
            updated_at: now,
        };
        (
            subscription,
            SubscriptionEvent::Created {
                plan: plan.id(),
                quantity,
            },
        )
    }

    // -- accessors ---------------------------------------------------------

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    pub fn plan_version(&self) -> PlanVersionId {
        self.plan_version
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn status(&self) -> SubscriptionStatus {
        self.status
    }

    pub fn period_start(&self) -> Timestamp {
        self.period_start
    }

    pub fn period_end(&self) -> Timestamp {
        self.period_end
    }

    pub fn trial_end(&self) -> Option<Timestamp> {
        self.trial_end
    }

    pub fn is_in_trial(&self) -> bool {
        self.status == SubscriptionStatus::Trial
    }

    pub fn cancel_at_period_end(&self) -> bool {
        self.cancel_at_period_end
    }

    pub fn paused_at(&self) -> Option<Timestamp> {
        self.paused_at
    }

    pub fn pause_resumes_at(&self) -> Option<Timestamp> {
        self.pause_resumes_at
    }

    pub fn pending_change(&self) -> Option<PendingChange> {
        self.pending_change
    }

    pub fn last_closed(&self) -> Option<ClosedPeriod> {
        self.last_closed
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    /// True when the current period boundary has been reached.
    pub fn is_due_for_close(&self, now: Timestamp) -> bool {
        self.status.is_billable() && !now.is_before(&self.period_end)
    }

    /// Fraction of the current period remaining at `at`, as whole days.
    pub fn days_remaining(&self, at: Timestamp) -> i64 {
        self.period_end.whole_days_since(&at).max(0)
    }

    /// Length of the current period in whole days.
    pub fn period_days(&self) -> i64 {
        self.period_end.whole_days_since(&self.period_start).max(1)
    }

    // -- lifecycle ---------------------------------------------------------

    /// Closes the current period and opens the next.
    ///
    /// Ends the trial when one was running. The closed period is retained
    /// for the late-usage grace window.
    pub fn roll_period(
        &mut self,
        next_end: Timestamp,
        now: Timestamp,
    ) -> Result<SubscriptionEvent, BillingError> {
        if !self.status.is_billable() {
            return Err(BillingError::conflict(format!(
                "cannot close a period on a {} subscription",
                self.status.as_str()
            )));
        }
        if self.status == SubscriptionStatus::Trial {
            self.status = self.status.transition_to(SubscriptionStatus::Active)?;
            self.trial_end = None;
        }
        let closing_start = self.period_start;
        let closing_end = self.period_end;
        self.last_closed = Some(ClosedPeriod {
            start: closing_start,
            end: closing_end,
            closed_at: now,
        });
        self.period_start = closing_end;
        self.period_end = next_end;
        self.updated_at = now;
        Ok(SubscriptionEvent::PeriodClosed {
            period_start: closing_start,
            period_end: closing_end,
        })
    }

    /// Requests cancellation at the end of the current period. Billing
    /// continues until the boundary; the boundary sweep finalizes it.
    pub fn schedule_cancel(&mut self, now: Timestamp) -> Result<SubscriptionEvent, BillingError> {
        if !self.status.can_transition_to(&SubscriptionStatus::Cancelled) {
            return Err(BillingError::invalid_transition(
                "Subscription",
                self.status,
                SubscriptionStatus::Cancelled,
            ));
        }
        self.cancel_at_period_end = true;
        self.updated_at = now;
        Ok(SubscriptionEvent::CancelScheduled)
    }

    /// Cancels immediately. No refund is issued for the unused remainder.
    pub fn cancel_now(&mut self, now: Timestamp) -> Result<SubscriptionEvent, BillingError> {
        self.status = self.status.transition_to(SubscriptionStatus::Cancelled)?;
        self.cancel_at_period_end = false;
        self.pending_change = None;
        self.updated_at = now;
        Ok(SubscriptionEvent::Cancelled)
    }

    /// Finalizes a scheduled cancellation at the period boundary. The
    /// period just ended is retained for late usage, same as a renewal.
    pub fn finalize_cancellation(&mut self, now: Timestamp) -> Result<SubscriptionEvent, BillingError> {
        if !self.cancel_at_period_end {
            return Err(BillingError::conflict(
                "subscription has no cancellation scheduled",
            ));
        }
        self.last_closed = Some(ClosedPeriod {
            start: self.period_start,
            end: self.period_end,
            closed_at: now,
        });
        self.status = self.status.transition_to(SubscriptionStatus::Cancelled)?;
        self.cancel_at_period_end = false;
        self.pending_change = None;
        self.updated_at = now;
        Ok(SubscriptionEvent::Cancelled)
    }

    /// Pauses an active subscription, optionally until a given time.
    /// Paused time does not bill and usage is rejected.
    pub fn pause(
        &mut self,
        resumes_at: Option<Timestamp>,
        now: Timestamp,
    ) -> Result<SubscriptionEvent, BillingError> {
        self.status = self.status.transition_to(SubscriptionStatus::Paused)?;
        self.paused_at = Some(now);
        self.pause_resumes_at = resumes_at;
        self.updated_at = now;
        Ok(SubscriptionEvent::Paused { resumes_at })
    }

    /// Resumes a paused subscription. The billing clock restarts: a fresh
    /// period opens at `now` and runs to `new_period_end`.
    pub fn resume(
        &mut self,
        new_period_end: Timestamp,
        now: Timestamp,
    ) -> Result<SubscriptionEvent, BillingError> {
        self.status = self.status.transition_to(SubscriptionStatus::Active)?;
        self.paused_at = None;
        self.pause_resumes_at = None;
        self.period_start = now;
        self.period_end = new_period_end;
        self.updated_at = now;
        Ok(SubscriptionEvent::Resumed)
    }

    /// Expires the subscription after payment retries are exhausted.
    pub fn expire(&mut self, now: Timestamp) -> Result<SubscriptionEvent, BillingError> {
        self.status = self.status.transition_to(SubscriptionStatus::Expired)?;
        self.pending_change = None;
        self.cancel_at_period_end = false;
        self.updated_at = now;
        Ok(SubscriptionEvent::Expired)
    }

    /// Moves to a new plan version and quantity immediately. The caller
    /// computes and invoices the proration pair; the aggregate only
    /// repoints the plan.
    pub fn change_plan_now(
        &mut self,
        target: PlanVersionId,
        quantity: u32,
        now: Timestamp,
    ) -> Result<SubscriptionEvent, BillingError> {
        if !self.status.is_billable() {
            return Err(BillingError::conflict(format!(
                "cannot change plan on a {} subscription",
                self.status.as_str()
            )));
        }
        let from = self.plan_version;
        self.plan_version = target;
        self.quantity = quantity;
        self.pending_change = None;
        self.updated_at = now;
        Ok(SubscriptionEvent::PlanChanged {
            from,
            to: target,
            quantity,
            immediate: true,
        })
    }

    /// Queues a plan or quantity change for the next boundary, replacing
    /// any change already queued.
    pub fn schedule_plan_change(
        &mut self,
        target: PlanVersionId,
        quantity: u32,
        now: Timestamp,
    ) -> Result<SubscriptionEvent, BillingError> {
        if !self.status.is_billable() {
            return Err(BillingError::conflict(format!(
                "cannot change plan on a {} subscription",
                self.status.as_str()
            )));
        }
        self.pending_change = Some(PendingChange {
            target,
            quantity,
            requested_at: now,
        });
        self.updated_at = now;
        Ok(SubscriptionEvent::PlanChangeScheduled {
            to: target,
            quantity,
        })
    }

    /// Applies the queued plan change at the boundary, if any.
    pub fn apply_pending_change(&mut self, now: Timestamp) -> Option<SubscriptionEvent> {
        let pending = self.pending_change.take()?;
        let from = self.plan_version;
        self.plan_version = pending.target;
        self.quantity = pending.quantity;
        self.updated_at = now;
        Some(SubscriptionEvent::PlanChanged {
            from,
            to: pending.target,
            quantity: pending.quantity,
            immediate: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{Currency, ErrorCode, Money};
    use crate::domain::plan::BillingInterval;
    use chrono::{DateTime, Utc};

    fn ts(rfc3339: &str) -> Timestamp {
        Timestamp::from_datetime(
            DateTime::parse_from_rfc3339(rfc3339)
                .unwrap()
                .with_timezone(&Utc),
        )
    }

    fn plan(trial_days: u32) -> PlanVersion {
        PlanVersion::create(
            "Pro",
            BillingInterval::Monthly,
            Money::from_cents(4900, Currency::usd()),
            trial_days,
            vec![],
            ts("2026-01-01T00:00:00Z"),
        )
        .unwrap()
    }

    #[test]
    fn trial_plan_starts_in_trial_with_trial_length_period() {
        let now = ts("2026-03-01T00:00:00Z");
        let (sub, event) = Subscription::create(AccountId::new(), &plan(14), 1, now);
        assert_eq!(sub.status(), SubscriptionStatus::Trial);
        assert_eq!(sub.period_end(), ts("2026-03-15T00:00:00Z"));
        assert_eq!(sub.trial_end(), Some(ts("2026-03-15T00:00:00Z")));
        assert!(matches!(event, SubscriptionEvent::Created { .. }));
    }

    #[test]
    fn no_trial_plan_starts_active() {
        let now = ts("2026-03-01T00:00:00Z");
        let (sub, _) = Subscription::create(AccountId::new(), &plan(0), 1, now);
        assert_eq!(sub.status(), SubscriptionStatus::Active);
        assert_eq!(sub.period_end(), ts("2026-04-01T00:00:00Z"));
        assert_eq!(sub.trial_end(), None);
    }

    #[test]
    fn roll_period_ends_trial_and_retains_closed_period() {
        let start = ts("2026-03-01T00:00:00Z");
        let (mut sub, _) = Subscription::create(AccountId::new(), &plan(14), 1, start);
        let boundary = ts("2026-03-15T00:00:00Z");

        assert!(sub.is_due_for_close(boundary));
        sub.roll_period(ts("2026-04-15T00:00:00Z"), boundary).unwrap();

        assert_eq!(sub.status(), SubscriptionStatus::Active);
        assert_eq!(sub.period_start(), boundary);
        let closed = sub.last_closed().unwrap();
        assert_eq!(closed.start, start);
        assert_eq!(closed.end, boundary);
        assert!(closed.within_grace(boundary.add_days(7), 7));
        assert!(!closed.within_grace(boundary.add_days(7).add_secs(1), 7));
    }

    #[test]
    fn scheduled_cancel_keeps_billing_until_boundary() {
        let now = ts("2026-03-01T00:00:00Z");
        let (mut sub, _) = Subscription::create(AccountId::new(), &plan(0), 1, now);
        sub.schedule_cancel(now).unwrap();
        assert_eq!(sub.status(), SubscriptionStatus::Active);
        assert!(sub.cancel_at_period_end());

        sub.finalize_cancellation(sub.period_end()).unwrap();
        assert_eq!(sub.status(), SubscriptionStatus::Cancelled);
        assert!(sub.last_closed().is_some());
    }

    #[test]
    fn cancel_now_is_terminal() {
        let now = ts("2026-03-01T00:00:00Z");
        let (mut sub, _) = Subscription::create(AccountId::new(), &plan(0), 1, now);
        sub.cancel_now(now).unwrap();
        let err = sub.pause(None, now).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidStateTransition);
    }

    #[test]
    fn pause_and_resume_restart_the_period_clock() {
        let now = ts("2026-03-01T00:00:00Z");
        let (mut sub, _) = Subscription::create(AccountId::new(), &plan(0), 1, now);

        let pause_at = ts("2026-03-10T00:00:00Z");
        sub.pause(Some(ts("2026-03-20T00:00:00Z")), pause_at).unwrap();
        assert_eq!(sub.status(), SubscriptionStatus::Paused);
        assert!(!sub.is_due_for_close(ts("2026-05-01T00:00:00Z")));

        let resume_at = ts("2026-03-20T00:00:00Z");
        sub.resume(ts("2026-04-20T00:00:00Z"), resume_at).unwrap();
        assert_eq!(sub.status(), SubscriptionStatus::Active);
        assert_eq!(sub.period_start(), resume_at);
        assert_eq!(sub.period_end(), ts("2026-04-20T00:00:00Z"));
        assert_eq!(sub.paused_at(), None);
    }

    #[test]
    fn trial_cannot_pause() {
        let now = ts("2026-03-01T00:00:00Z");
        let (mut sub, _) = Subscription::create(AccountId::new(), &plan(14), 1, now);
        assert!(sub.pause(None, now).is_err());
    }

    #[test]
    fn pending_change_last_write_wins() {
        let now = ts("2026-03-01T00:00:00Z");
        let (mut sub, _) = Subscription::create(AccountId::new(), &plan(0), 1, now);

        let first = PlanVersionId::new();
        let second = PlanVersionId::new();
        sub.schedule_plan_change(first, 1, now).unwrap();
        sub.schedule_plan_change(second, 5, now.add_days(1)).unwrap();
        assert_eq!(sub.pending_change().unwrap().target, second);

        let event = sub.apply_pending_change(sub.period_end()).unwrap();
        assert!(matches!(
            event,
            SubscriptionEvent::PlanChanged { to, immediate: false, .. } if to == second
        ));
        assert_eq!(sub.plan_version(), second);
        assert_eq!(sub.quantity(), 5);
        assert!(sub.apply_pending_change(now).is_none());
    }

    #[test]
    fn immediate_change_clears_pending() {
        let now = ts("2026-03-01T00:00:00Z");
        let (mut sub, _) = Subscription::create(AccountId::new(), &plan(0), 1, now);
        sub.schedule_plan_change(PlanVersionId::new(), 1, now).unwrap();

        let target = PlanVersionId::new();
        sub.change_plan_now(target, 1, now.add_days(2)).unwrap();
        assert_eq!(sub.plan_version(), target);
        assert!(sub.pending_change().is_none());
    }

    #[test]
    fn expire_from_active_or_paused() {
        let now = ts("2026-03-01T00:00:00Z");
        let (mut sub, _) = Subscription::create(AccountId::new(), &plan(0), 1, now);
        sub.expire(now).unwrap();
        assert_eq!(sub.status(), SubscriptionStatus::Expired);

        let (mut sub, _) = Subscription::create(AccountId::new(), &plan(0), 1, now);
        sub.pause(None, now).unwrap();
        sub.expire(now).unwrap();
        assert_eq!(sub.status(), SubscriptionStatus::Expired);
    }

    #[test]
    fn expire_is_rejected_after_cancellation() {
        let now = ts("2026-03-01T00:00:00Z");
        let (mut sub, _) = Subscription::create(AccountId::new(), &plan(0), 1, now);
        sub.cancel_now(now).unwrap();
        assert!(sub.expire(now).is_err());
    }
}
