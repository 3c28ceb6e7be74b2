//! Payment collection for an open invoice.
//!
//! One attempt per call. Attempts are recorded before the gateway is
//! asked, keyed so that overlapping sweeps or crash-and-retry runs
//! collapse into a single charge. Failures schedule the next retry on
//! the fixed day 3/5/7/10 ladder; the fifth failure exhausts collection,
//! expires the subscription, and blocks the account.

use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::foundation::{
    BillingError, ErrorCode, IdempotencyKey, InvoiceId, Timestamp,
};
use crate::domain::invoice::{Invoice, InvoiceStatus};
use crate::domain::payment::{
    is_exhausted, next_retry_at, AttemptStatus, DunningLevel, PaymentAttempt,
};
use crate::domain::subscription::{HistoryRecord, SubscriptionStatus};
use crate::ports::{
    BillingProfiles, ChargeOutcome, ChargeRequest, Clock, DunningLedger, EntityLock,
    GatewayError, HistoryStore, InvoiceRepository, LockScope, Notification, Notifier,
    PaymentAttemptRepository, PaymentGateway, ScheduledTask, SubscriptionRepository, TaskKind,
    WorkQueue,
};

pub struct CollectInvoicePayment {
    invoices: Arc<dyn InvoiceRepository>,
    attempts: Arc<dyn PaymentAttemptRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    profiles: Arc<dyn BillingProfiles>,
    gateway: Arc<dyn PaymentGateway>,
    dunning: Arc<dyn DunningLedger>,
    work_queue: Arc<dyn WorkQueue>,
    notifier: Arc<dyn Notifier>,
    history: Arc<dyn HistoryStore>,
    locks: Arc<dyn EntityLock>,
    clock: Arc<dyn Clock>,
}

/// Result of one collection call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionOutcome {
    AlreadyPaid,
    Settled,
    Failed {
        reason: String,
        next_retry_at: Option<Timestamp>,
        exhausted: bool,
    },
}

impl CollectInvoicePayment {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        invoices: Arc<dyn InvoiceRepository>,
        attempts: Arc<dyn PaymentAttemptRepository>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        profiles: Arc<dyn BillingProfiles>,
        gateway: Arc<dyn PaymentGateway>,
        dunning: Arc<dyn DunningLedger>,
        work_queue: Arc<dyn WorkQueue>,
        notifier: Arc<dyn Notifier>,
        history: Arc<dyn HistoryStore>,
        locks: Arc<dyn EntityLock>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            invoices,
            attempts,
            subscriptions,
            profiles,
            gateway,
            dunning,
            work_queue,
            notifier,
            history,
            locks,
            clock,
        }
    }

    /// Attempts to collect an open invoice. A caller-supplied key makes
    /// the call replayable; absent one, the key derives from the invoice
    /// and attempt number so concurrent sweeps agree on it.
    pub async fn execute(
        &self,
        invoice_id: InvoiceId,
        key: Option<IdempotencyKey>,
    ) -> Result<CollectionOutcome, BillingError> {
        let _lease = self.locks.acquire(LockScope::Invoice(invoice_id)).await?;
        let now = self.clock.now();

        let mut invoice = self
            .invoices
            .find(invoice_id)
            .await?
            .ok_or_else(|| BillingError::not_found(ErrorCode::InvoiceNotFound, invoice_id))?;
        match invoice.status() {
            InvoiceStatus::Open => {}
            InvoiceStatus::Paid => return Ok(CollectionOutcome::AlreadyPaid),
            status => {
                return Err(BillingError::conflict(format!(
                    "cannot collect a {} invoice",
                    status.as_str()
                )));
            }
        }

        let failed_so_far = self.attempts.count_failed(invoice_id).await?;
        let attempt_number = failed_so_far + 1;
        let key = key
            .unwrap_or_else(|| IdempotencyKey::for_payment_retry(&invoice_id, attempt_number));

        // Same key, same outcome: replay instead of re-charging.
        if let Some(existing) = self.attempts.find_by_idempotency_key(&key).await? {
            return match existing.status() {
                AttemptStatus::Succeeded => {
                    if invoice.status() == InvoiceStatus::Open {
                        self.settle(&mut invoice, now).await?;
                    }
                    Ok(CollectionOutcome::Settled)
                }
                AttemptStatus::Failed => Ok(CollectionOutcome::Failed {
                    reason: existing.failure_reason().unwrap_or("unknown").to_string(),
                    next_retry_at: None,
                    exhausted: is_exhausted(failed_so_far),
                }),
                AttemptStatus::Pending => Err(BillingError::new(
                    ErrorCode::Conflict,
                    "a payment attempt with this key is still in flight",
                )),
            };
        }

        let profile = self
            .profiles
            .find(invoice.account_id())
            .await?
            .ok_or_else(|| {
                BillingError::not_found(ErrorCode::AccountNotFound, invoice.account_id())
            })?;

        let mut attempt = PaymentAttempt::open(
            invoice_id,
            invoice.account_id(),
            attempt_number,
            key.clone(),
            invoice.amount_due(),
            now,
        );

        let Some(payment_method) = profile.payment_method.clone() else {
            attempt.fail("no_payment_method", now)?;
            self.attempts.save(&attempt).await?;
            return self
                .handle_failure(&invoice, attempt_number, "no_payment_method", now)
                .await;
        };

        self.attempts.save(&attempt).await?;
        let request = ChargeRequest {
            idempotency_key: key,
            account_id: invoice.account_id(),
            invoice_id,
            amount: invoice.amount_due(),
            payment_method,
        };

        match self.gateway.charge(&request).await {
            Ok(ChargeOutcome::Approved { transaction_ref }) => {
                attempt.succeed(transaction_ref, now)?;
                self.attempts.save(&attempt).await?;
                self.settle(&mut invoice, now).await?;
                Ok(CollectionOutcome::Settled)
            }
            Ok(ChargeOutcome::Declined { reason }) => {
                attempt.fail(reason.clone(), now)?;
                self.attempts.save(&attempt).await?;
                self.handle_failure(&invoice, attempt_number, &reason, now).await
            }
            Err(GatewayError::Timeout) => {
                attempt.fail_timeout(now)?;
                self.attempts.save(&attempt).await?;
                warn!(
                    invoice_id = %invoice_id,
                    attempt = attempt_number,
                    "gateway timeout, attempt flagged for reconciliation"
                );
                self.handle_failure(&invoice, attempt_number, "timeout", now).await
            }
            Err(err) => {
                let reason = err.to_string();
                attempt.fail(reason.clone(), now)?;
                self.attempts.save(&attempt).await?;
                self.handle_failure(&invoice, attempt_number, &reason, now).await
            }
        }
    }

    /// Marks the invoice paid and clears the account's standing when no
    /// other overdue invoice remains.
    async fn settle(&self, invoice: &mut Invoice, now: Timestamp) -> Result<(), BillingError> {
        invoice.record_payment(now)?;
        self.invoices.save(invoice).await?;

        let still_overdue = self
            .invoices
            .list_open_for_account(invoice.account_id())
            .await?
            .iter()
            .any(|i| i.days_past_due(now).unwrap_or(-1) > 0);
        if !still_overdue {
            self.dunning
                .set_level(invoice.account_id(), DunningLevel::Current, now)
                .await?;
        }

        info!(
            invoice_id = %invoice.id(),
            account_id = %invoice.account_id(),
            "invoice settled"
        );
        self.notify(Notification::PaymentSucceeded {
            account_id: invoice.account_id(),
            invoice_id: invoice.id(),
            amount: invoice.amount_due(),
        })
        .await;
        Ok(())
    }

    /// Schedules the next retry, or on the final failure expires the
    /// subscription and blocks the account.
    async fn handle_failure(
        &self,
        invoice: &Invoice,
        attempt_number: u32,
        reason: &str,
        now: Timestamp,
    ) -> Result<CollectionOutcome, BillingError> {
        let failed_total = attempt_number;
        if is_exhausted(failed_total) {
            let subscription_id = invoice.subscription_id();
            // Pausing does not shield a subscription from exhaustion, so
            // both Active and Paused expire here. The subscription lock
            // serializes the save against the lifecycle handlers.
            let expired = {
                let _lease = self
                    .locks
                    .acquire(LockScope::Subscription(subscription_id))
                    .await?;
                match self.subscriptions.find(subscription_id).await? {
                    Some(mut sub)
                        if matches!(
                            sub.status(),
                            SubscriptionStatus::Active | SubscriptionStatus::Paused
                        ) =>
                    {
                        let event = sub.expire(now)?;
                        self.subscriptions.save(&sub).await?;
                        self.history
                            .append(HistoryRecord::new(event, &sub, now))
                            .await?;
                        true
                    }
                    _ => false,
                }
            };
            self.dunning
                .set_level(invoice.account_id(), DunningLevel::Blocked, now)
                .await?;
            warn!(
                invoice_id = %invoice.id(),
                account_id = %invoice.account_id(),
                reason,
                "payment retries exhausted"
            );
            if expired {
                self.notify(Notification::SubscriptionExpired {
                    account_id: invoice.account_id(),
                    subscription_id,
                })
                .await;
            }
            return Ok(CollectionOutcome::Failed {
                reason: reason.to_string(),
                next_retry_at: None,
                exhausted: true,
            });
        }

        let due_at = invoice.due_at().unwrap_or(now);
        let next = next_retry_at(due_at, failed_total);
        if let Some(run_at) = next {
            self.work_queue
                .schedule(ScheduledTask::new(
                    run_at,
                    TaskKind::PaymentRetry {
                        invoice_id: invoice.id(),
                        attempt_number: failed_total + 1,
                    },
                ))
                .await?;
        }
        info!(
            invoice_id = %invoice.id(),
            attempt = attempt_number,
            reason,
            next_retry_at = next.map(|t| t.to_string()),
            "payment attempt failed"
        );
        self.notify(Notification::PaymentFailed {
            account_id: invoice.account_id(),
            invoice_id: invoice.id(),
            reason: reason.to_string(),
            next_retry_at: next,
        })
        .await;
        Ok(CollectionOutcome::Failed {
            reason: reason.to_string(),
            next_retry_at: next,
            exhausted: false,
        })
    }

    async fn notify(&self, notification: Notification) {
        if let Err(err) = self.notifier.notify(notification).await {
            warn!(%err, "notification delivery failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryBillingProfiles, InMemoryDunningLedger, InMemoryEntityLock,
        InMemoryHistoryStore, InMemoryInvoiceRepository, InMemoryPaymentAttemptRepository,
        InMemorySubscriptionRepository, InMemoryWorkQueue, ManualClock, MockGateway,
        RecordingNotifier, ScriptedCharge,
    };
    use crate::domain::foundation::{AccountId, Currency, Money, SubscriptionId};
    use crate::domain::invoice::{InvoiceNumber, LineItem, LineItemKind};
    use crate::domain::plan::{BillingInterval, PlanVersion};
    use crate::domain::subscription::Subscription;
    use crate::ports::BillingProfile;

    struct Fixture {
        handler: CollectInvoicePayment,
        invoices: Arc<InMemoryInvoiceRepository>,
        attempts: Arc<InMemoryPaymentAttemptRepository>,
        subscriptions: Arc<InMemorySubscriptionRepository>,
        gateway: Arc<MockGateway>,
        dunning: Arc<InMemoryDunningLedger>,
        work_queue: Arc<InMemoryWorkQueue>,
        notifier: Arc<RecordingNotifier>,
        clock: Arc<ManualClock>,
        account_id: AccountId,
        sub: Subscription,
    }

    async fn fixture(with_payment_method: bool) -> Fixture {
        let invoices = Arc::new(InMemoryInvoiceRepository::new());
        let attempts = Arc::new(InMemoryPaymentAttemptRepository::new());
        let subscriptions = Arc::new(InMemorySubscriptionRepository::new());
        let profiles = Arc::new(InMemoryBillingProfiles::new());
        let gateway = Arc::new(MockGateway::new());
        let dunning = Arc::new(InMemoryDunningLedger::new());
        let work_queue = Arc::new(InMemoryWorkQueue::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let clock = Arc::new(ManualClock::at(crate::domain::foundation::Timestamp::now()));

        let account_id = AccountId::new();
        profiles
            .save(&BillingProfile {
                account_id,
                jurisdiction: "US-NY".into(),
                tax_exempt: true,
                vat_id: None,
                payment_method: with_payment_method.then(|| "pm_test".into()),
            })
            .await
            .unwrap();

        let plan = PlanVersion::create(
            "Pro",
            BillingInterval::Monthly,
            Money::from_cents(4900, Currency::usd()),
            0,
            vec![],
            clock.now(),
        )
        .unwrap();
        let (sub, _) = Subscription::create(account_id, &plan, 1, clock.now());
        subscriptions.save(&sub).await.unwrap();

        let handler = CollectInvoicePayment::new(
            invoices.clone(),
            attempts.clone(),
            subscriptions.clone(),
            profiles,
            gateway.clone(),
            dunning.clone(),
            work_queue.clone(),
            notifier.clone(),
            Arc::new(InMemoryHistoryStore::new()),
            Arc::new(InMemoryEntityLock::new()),
            clock.clone(),
        );
        Fixture {
            handler,
            invoices,
            attempts,
            subscriptions,
            gateway,
            dunning,
            work_queue,
            notifier,
            clock,
            account_id,
            sub,
        }
    }

    async fn open_invoice(f: &Fixture, cents: i64) -> Invoice {
        let now = f.clock.now();
        let mut invoice = Invoice::draft(
            f.account_id,
            f.sub.id(),
            Currency::usd(),
            now.minus_days(30),
            now,
            now,
        );
        invoice
            .push_line(LineItem::new(
                LineItemKind::RecurringCharge,
                "Pro plan",
                Money::from_cents(cents, Currency::usd()),
            ))
            .unwrap();
        let sequence = f.invoices.next_invoice_number().await.unwrap();
        invoice
            .finalize(InvoiceNumber::from_sequence(sequence).unwrap(), now, now)
            .unwrap();
        f.invoices.save(&invoice).await.unwrap();
        invoice
    }

    #[tokio::test]
    async fn successful_charge_settles_and_notifies() {
        let f = fixture(true).await;
        let invoice = open_invoice(&f, 4900).await;

        let outcome = f.handler.execute(invoice.id(), None).await.unwrap();
        assert_eq!(outcome, CollectionOutcome::Settled);

        let stored = f.invoices.find(invoice.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), InvoiceStatus::Paid);
        let recorded = f.attempts.list_for_invoice(invoice.id()).await.unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].status(), AttemptStatus::Succeeded);
        assert!(f
            .notifier
            .sent()
            .iter()
            .any(|n| matches!(n, Notification::PaymentSucceeded { .. })));
    }

    #[tokio::test]
    async fn repeated_calls_with_same_key_charge_once() {
        let f = fixture(true).await;
        let invoice = open_invoice(&f, 4900).await;
        let key = IdempotencyKey::new("collect-1").unwrap();

        let first = f.handler.execute(invoice.id(), Some(key.clone())).await.unwrap();
        let second = f.handler.execute(invoice.id(), Some(key)).await.unwrap();

        assert_eq!(first, CollectionOutcome::Settled);
        // Second call observes the invoice already paid.
        assert_eq!(second, CollectionOutcome::AlreadyPaid);
        assert_eq!(f.gateway.settled_count(), 1);
        assert_eq!(f.attempts.list_for_invoice(invoice.id()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn decline_schedules_retry_on_day_three() {
        let f = fixture(true).await;
        let invoice = open_invoice(&f, 4900).await;
        f.gateway.script(ScriptedCharge::Decline("card_declined".into()));

        let outcome = f.handler.execute(invoice.id(), None).await.unwrap();
        let CollectionOutcome::Failed {
            reason,
            next_retry_at,
            exhausted,
        } = outcome
        else {
            panic!("expected failure");
        };
        assert_eq!(reason, "card_declined");
        assert!(!exhausted);
        assert_eq!(next_retry_at, invoice.due_at().map(|d| d.add_days(3)));

        let pending = f.work_queue.pending();
        assert_eq!(pending.len(), 1);
        assert!(matches!(
            pending[0].kind,
            TaskKind::PaymentRetry { attempt_number: 2, .. }
        ));
    }

    #[tokio::test]
    async fn timeout_counts_as_failure_and_flags_reconciliation() {
        let f = fixture(true).await;
        let invoice = open_invoice(&f, 4900).await;
        f.gateway.script(ScriptedCharge::Timeout { settled: true });

        let outcome = f.handler.execute(invoice.id(), None).await.unwrap();
        assert!(matches!(outcome, CollectionOutcome::Failed { .. }));

        let flagged = f.attempts.list_needing_reconciliation().await.unwrap();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].failure_reason(), Some("timeout"));
    }

    #[tokio::test]
    async fn missing_payment_method_is_a_recorded_failure() {
        let f = fixture(false).await;
        let invoice = open_invoice(&f, 4900).await;

        let outcome = f.handler.execute(invoice.id(), None).await.unwrap();
        let CollectionOutcome::Failed { reason, .. } = outcome else {
            panic!("expected failure");
        };
        assert_eq!(reason, "no_payment_method");
        assert!(f.gateway.charges().is_empty());
        assert_eq!(f.attempts.count_failed(invoice.id()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn fifth_failure_exhausts_expires_and_blocks() {
        let f = fixture(true).await;
        let invoice = open_invoice(&f, 4900).await;

        for attempt in 1..=5u32 {
            f.gateway.script(ScriptedCharge::Decline("card_declined".into()));
            let key = IdempotencyKey::for_payment_retry(&invoice.id(), attempt);
            let outcome = f.handler.execute(invoice.id(), Some(key)).await.unwrap();
            let CollectionOutcome::Failed { exhausted, .. } = outcome else {
                panic!("expected failure");
            };
            assert_eq!(exhausted, attempt == 5);
        }

        let sub = f.subscriptions.find(f.sub.id()).await.unwrap().unwrap();
        assert_eq!(sub.status(), SubscriptionStatus::Expired);
        assert_eq!(
            f.dunning.level_for(f.account_id).await.unwrap(),
            DunningLevel::Blocked
        );
        assert!(f
            .notifier
            .sent()
            .iter()
            .any(|n| matches!(n, Notification::SubscriptionExpired { .. })));
        // Four retries were scheduled; the fifth failure schedules nothing.
        assert_eq!(f.work_queue.pending().len(), 4);
    }

    #[tokio::test]
    async fn exhaustion_expires_a_paused_subscription() {
        let f = fixture(true).await;
        let invoice = open_invoice(&f, 4900).await;

        // Pause while the invoice sits in the retry ladder.
        let mut sub = f.subscriptions.find(f.sub.id()).await.unwrap().unwrap();
        sub.pause(None, f.clock.now()).unwrap();
        f.subscriptions.save(&sub).await.unwrap();

        for attempt in 1..=5u32 {
            f.gateway.script(ScriptedCharge::Decline("card_declined".into()));
            let key = IdempotencyKey::for_payment_retry(&invoice.id(), attempt);
            f.handler.execute(invoice.id(), Some(key)).await.unwrap();
        }

        let sub = f.subscriptions.find(f.sub.id()).await.unwrap().unwrap();
        assert_eq!(sub.status(), SubscriptionStatus::Expired);
        assert_eq!(
            f.dunning.level_for(f.account_id).await.unwrap(),
            DunningLevel::Blocked
        );
        assert!(f
            .notifier
            .sent()
            .iter()
            .any(|n| matches!(n, Notification::SubscriptionExpired { .. })));
    }

    #[tokio::test]
    async fn exhaustion_on_a_cancelled_subscription_reports_nothing_expired() {
        let f = fixture(true).await;
        let invoice = open_invoice(&f, 4900).await;

        let mut sub = f.subscriptions.find(f.sub.id()).await.unwrap().unwrap();
        sub.cancel_now(f.clock.now()).unwrap();
        f.subscriptions.save(&sub).await.unwrap();

        for attempt in 1..=5u32 {
            f.gateway.script(ScriptedCharge::Decline("card_declined".into()));
            let key = IdempotencyKey::for_payment_retry(&invoice.id(), attempt);
            f.handler.execute(invoice.id(), Some(key)).await.unwrap();
        }

        let sub = f.subscriptions.find(f.sub.id()).await.unwrap().unwrap();
        assert_eq!(sub.status(), SubscriptionStatus::Cancelled);
        // Still blocked for collections, but no expiry notice goes out.
        assert_eq!(
            f.dunning.level_for(f.account_id).await.unwrap(),
            DunningLevel::Blocked
        );
        assert!(!f
            .notifier
            .sent()
            .iter()
            .any(|n| matches!(n, Notification::SubscriptionExpired { .. })));
    }

    #[tokio::test]
    async fn settlement_clears_dunning_when_nothing_else_overdue() {
        let f = fixture(true).await;
        let invoice = open_invoice(&f, 4900).await;
        f.dunning
            .set_level(f.account_id, DunningLevel::Warning, f.clock.now())
            .await
            .unwrap();

        f.clock.advance_days(8);
        f.handler.execute(invoice.id(), None).await.unwrap();
        assert_eq!(
            f.dunning.level_for(f.account_id).await.unwrap(),
            DunningLevel::Current
        );
    }
}
