//! Integration tests for the billing cycle.
//!
//! These tests drive full lifecycles through the engine:
//! 1. Boundary sweep closes a period and finalizes the invoice
//! 2. Collection charges the gateway and settles or schedules retries
//! 3. Dunning escalates on overdue invoices and clears on settlement
//! 4. Retry exhaustion expires the subscription and blocks the account
//!
//! Uses in-memory implementations to test the flow without external dependencies.

use std::sync::Arc;

use cyclebill::adapters::memory::{
    FlatRateTaxService, InMemoryBillingProfiles, InMemoryCreditRepository, InMemoryDunningLedger,
    InMemoryEntityLock, InMemoryHistoryStore, InMemoryInvoiceRepository,
    InMemoryPaymentAttemptRepository, InMemoryPlanRepository, InMemorySubscriptionRepository,
    InMemoryUsageStore, InMemoryWorkQueue, ManualClock, MockGateway, RecordingNotifier,
    ScriptedCharge,
};
use cyclebill::application::{BillingEngine, EnginePorts};
use cyclebill::config::BillingConfig;
use cyclebill::domain::foundation::{AccountId, Currency, IdempotencyKey, Money, Timestamp};
use cyclebill::domain::invoice::InvoiceStatus;
use cyclebill::domain::payment::DunningLevel;
use cyclebill::domain::plan::{
    BillingInterval, MeteredComponent, PlanVersion, TierOverflow, TierSchedule, UsageTier,
};
use cyclebill::domain::subscription::{Subscription, SubscriptionStatus};
use cyclebill::ports::{
    BillingProfile, BillingProfiles, Clock, DunningLedger, InvoiceRepository, Notification,
    PlanRepository, SubscriptionRepository,
};

// =============================================================================
// Test Harness
// =============================================================================

/// Pinned to April 2026 so month arithmetic in assertions is stable.
fn t0() -> Timestamp {
    Timestamp::from_unix_secs(1_775_001_600)
}

struct Harness {
    engine: BillingEngine,
    clock: Arc<ManualClock>,
    gateway: Arc<MockGateway>,
    notifier: Arc<RecordingNotifier>,
    dunning: Arc<InMemoryDunningLedger>,
    subscriptions: Arc<InMemorySubscriptionRepository>,
    invoices: Arc<InMemoryInvoiceRepository>,
    work_queue: Arc<InMemoryWorkQueue>,
    plans: Arc<InMemoryPlanRepository>,
    profiles: Arc<InMemoryBillingProfiles>,
}

fn harness() -> Harness {
    let clock = Arc::new(ManualClock::at(t0()));
    let gateway = Arc::new(MockGateway::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let dunning = Arc::new(InMemoryDunningLedger::new());
    let subscriptions = Arc::new(InMemorySubscriptionRepository::new());
    let invoices = Arc::new(InMemoryInvoiceRepository::new());
    let work_queue = Arc::new(InMemoryWorkQueue::new());
    let plans = Arc::new(InMemoryPlanRepository::new());
    let profiles = Arc::new(InMemoryBillingProfiles::new());

    let ports = EnginePorts {
        subscriptions: subscriptions.clone(),
        plans: plans.clone(),
        invoices: invoices.clone(),
        attempts: Arc::new(InMemoryPaymentAttemptRepository::new()),
        credits: Arc::new(InMemoryCreditRepository::new()),
        usage: Arc::new(InMemoryUsageStore::new()),
        profiles: profiles.clone(),
        history: Arc::new(InMemoryHistoryStore::new()),
        dunning: dunning.clone(),
        work_queue: work_queue.clone(),
        gateway: gateway.clone(),
        tax: Arc::new(FlatRateTaxService::new(0)),
        notifier: notifier.clone(),
        locks: Arc::new(InMemoryEntityLock::new()),
        clock: clock.clone(),
    };
    let engine = BillingEngine::new(ports, &BillingConfig::default());

    Harness {
        engine,
        clock,
        gateway,
        notifier,
        dunning,
        subscriptions,
        invoices,
        work_queue,
        plans,
        profiles,
    }
}

impl Harness {
    /// Seeds a billing profile and a $49/month plan with a tiered
    /// `api_calls` component (first 1,000 free, then 1 cent per unit),
    /// then subscribes the account.
    async fn subscribe(&self, trial_days: u32) -> Subscription {
        let schedule = TierSchedule::new(
            vec![
                UsageTier {
                    up_to: Some(1000),
                    unit_price_millicents: 0,
                },
                UsageTier {
                    up_to: None,
                    unit_price_millicents: 1000,
                },
            ],
            TierOverflow::OpenEnded,
        )
        .unwrap();
        let plan = PlanVersion::create(
            "Pro",
            BillingInterval::Monthly,
            Money::from_cents(4900, Currency::usd()),
            trial_days,
            vec![MeteredComponent::new("api_calls", schedule).unwrap()],
            self.clock.now(),
        )
        .unwrap();
        self.plans.save(&plan).await.unwrap();

        let account_id = AccountId::new();
        self.profiles
            .save(&BillingProfile {
                account_id,
                jurisdiction: "US-NY".into(),
                tax_exempt: false,
                vat_id: None,
                payment_method: Some("pm_test".into()),
            })
            .await
            .unwrap();

        self.engine
            .create_subscription
            .execute(account_id, plan.id(), 1)
            .await
            .unwrap()
    }

    async fn reload(&self, sub: &Subscription) -> Subscription {
        self.subscriptions.find(sub.id()).await.unwrap().unwrap()
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn trial_converts_bills_usage_and_settles() {
    let h = harness();
    let sub = h.subscribe(14).await;
    assert_eq!(sub.status(), SubscriptionStatus::Trial);
    let trial_end = sub.period_end();

    // 3,500 units during the trial: 2,500 billable at 1 cent.
    h.clock.advance_days(10);
    h.engine
        .ingest_usage
        .execute(
            sub.id(),
            "api_calls",
            3500,
            h.clock.now(),
            IdempotencyKey::generate(),
        )
        .await
        .unwrap();

    h.clock.advance_days(4);
    let report = h.engine.billing_cycle_sweep.run().await;
    assert_eq!(report.processed, 1);
    assert_eq!(report.failed, 0);

    let invoices = h.invoices.list_for_subscription(sub.id()).await.unwrap();
    assert_eq!(invoices.len(), 1);
    let invoice = &invoices[0];
    assert!(invoice.number().is_some());
    assert_eq!(invoice.status(), InvoiceStatus::Paid);
    // $49.00 renewal plus $25.00 of trial usage.
    assert_eq!(invoice.total().cents(), 7400);
    assert_eq!(h.gateway.settled_count(), 1);

    let sub = h.reload(&sub).await;
    assert_eq!(sub.status(), SubscriptionStatus::Active);
    assert_eq!(
        sub.period_end(),
        BillingInterval::Monthly.advance(trial_end)
    );

    let sent = h.notifier.sent();
    assert!(sent
        .iter()
        .any(|n| matches!(n, Notification::InvoiceFinalized { .. })));
    assert!(sent
        .iter()
        .any(|n| matches!(n, Notification::PaymentSucceeded { .. })));
    assert_eq!(
        h.dunning.level_for(sub.account_id()).await.unwrap(),
        DunningLevel::Current
    );
}

#[tokio::test]
async fn declined_charge_retries_escalates_and_recovers() {
    let h = harness();
    let sub = h.subscribe(0).await;

    h.clock.advance_days(31);
    h.gateway
        .script(ScriptedCharge::Decline("card_declined".into()));
    h.engine.billing_cycle_sweep.run().await;

    let invoices = h.invoices.list_for_subscription(sub.id()).await.unwrap();
    let invoice = &invoices[0];
    assert_eq!(invoice.status(), InvoiceStatus::Open);
    let due_at = invoice.due_at().unwrap();

    // First retry sits three days past the due date.
    let pending = h.work_queue.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].run_at, due_at.add_days(3));

    // The retry declines too and schedules the next rung.
    h.clock.set(due_at.add_days(3));
    h.gateway
        .script(ScriptedCharge::Decline("card_declined".into()));
    h.engine.payment_retry_sweep.run().await;
    assert_eq!(h.invoices.find(invoice.id()).await.unwrap().unwrap().status(), InvoiceStatus::Open);

    // Eight days past due crosses the warning threshold.
    h.clock.set(due_at.add_days(8));
    h.engine.dunning_sweep.run().await;
    assert_eq!(
        h.dunning.level_for(sub.account_id()).await.unwrap(),
        DunningLevel::Warning
    );
    assert!(h
        .notifier
        .sent()
        .iter()
        .any(|n| matches!(n, Notification::AccountWarned { .. })));

    // The day-5 retry is overdue by now; an approval settles the invoice
    // and clears the dunning level.
    h.gateway.script(ScriptedCharge::Approve);
    h.engine.payment_retry_sweep.run().await;

    let invoice = h.invoices.find(invoice.id()).await.unwrap().unwrap();
    assert_eq!(invoice.status(), InvoiceStatus::Paid);
    assert!(h.work_queue.pending().is_empty());
    assert_eq!(
        h.dunning.level_for(sub.account_id()).await.unwrap(),
        DunningLevel::Current
    );
    assert!(h
        .notifier
        .sent()
        .iter()
        .any(|n| matches!(n, Notification::PaymentSucceeded { .. })));
}

#[tokio::test]
async fn exhausted_retries_expire_the_subscription() {
    let h = harness();
    let sub = h.subscribe(0).await;

    h.clock.advance_days(31);
    h.gateway
        .script(ScriptedCharge::Decline("insufficient_funds".into()));
    h.engine.billing_cycle_sweep.run().await;

    let invoices = h.invoices.list_for_subscription(sub.id()).await.unwrap();
    let invoice_id = invoices[0].id();
    let due_at = invoices[0].due_at().unwrap();

    // Walk the whole retry ladder, declining every rung.
    for offset in [3, 5, 7, 10] {
        h.clock.set(due_at.add_days(offset));
        h.gateway
            .script(ScriptedCharge::Decline("insufficient_funds".into()));
        h.engine.payment_retry_sweep.run().await;
    }

    let invoice = h.invoices.find(invoice_id).await.unwrap().unwrap();
    assert_eq!(invoice.status(), InvoiceStatus::Open);
    assert!(h.work_queue.pending().is_empty());

    let sub = h.reload(&sub).await;
    assert_eq!(sub.status(), SubscriptionStatus::Expired);
    assert_eq!(
        h.dunning.level_for(sub.account_id()).await.unwrap(),
        DunningLevel::Blocked
    );
    assert!(h
        .notifier
        .sent()
        .iter()
        .any(|n| matches!(n, Notification::SubscriptionExpired { .. })));

    // A blocked account cannot open a fresh subscription.
    let plan_id = sub.plan_version();
    let err = h
        .engine
        .create_subscription
        .execute(sub.account_id(), plan_id, 1)
        .await
        .unwrap_err();
    assert_eq!(
        err.code,
        cyclebill::domain::foundation::ErrorCode::PaymentRequired
    );
}

#[tokio::test]
async fn timed_out_charge_reconciles_from_gateway_state() {
    let h = harness();
    let sub = h.subscribe(0).await;

    // The charge times out but actually went through at the gateway.
    h.clock.advance_days(31);
    h.gateway.script(ScriptedCharge::Timeout { settled: true });
    h.engine.billing_cycle_sweep.run().await;

    let invoices = h.invoices.list_for_subscription(sub.id()).await.unwrap();
    let invoice_id = invoices[0].id();
    assert_eq!(invoices[0].status(), InvoiceStatus::Open);

    // The retry sweep reconciles flagged attempts before charging again,
    // so the gateway's answer settles the invoice without a second charge.
    let charges_before = h.gateway.charges().len();
    h.clock.advance_days(1);
    h.engine.payment_retry_sweep.run().await;

    let invoice = h.invoices.find(invoice_id).await.unwrap().unwrap();
    assert_eq!(invoice.status(), InvoiceStatus::Paid);
    assert_eq!(h.gateway.charges().len(), charges_before);
}
