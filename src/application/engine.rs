//! Engine wiring.
//!
//! `BillingEngine` builds every handler and sweep from one bundle of port
//! implementations, so the daemon and the integration tests share the
//! same composition.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::application::handlers::billing::{ClosePeriod, InvoiceAssembler, IssueCredit, VoidInvoice};
use crate::application::handlers::payment::{CollectInvoicePayment, ReconcilePayments};
use crate::application::handlers::subscription::{
    CancelSubscription, ChangePlan, CreateSubscription, PauseSubscription, ResumeSubscription,
};
use crate::application::handlers::usage::IngestUsage;
use crate::application::sweeps::{
    BillingCycleSweep, DunningSweep, PauseExpirySweep, PaymentRetrySweep,
};
use crate::config::BillingConfig;
use crate::ports::{
    BillingProfiles, Clock, CreditRepository, DunningLedger, EntityLock, HistoryStore,
    InvoiceRepository, Notifier, PaymentAttemptRepository, PaymentGateway, PlanRepository,
    SubscriptionRepository, TaxService, UsageStore, WorkQueue,
};

/// Every port implementation the engine needs.
#[derive(Clone)]
pub struct EnginePorts {
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub plans: Arc<dyn PlanRepository>,
    pub invoices: Arc<dyn InvoiceRepository>,
    pub attempts: Arc<dyn PaymentAttemptRepository>,
    pub credits: Arc<dyn CreditRepository>,
    pub usage: Arc<dyn UsageStore>,
    pub profiles: Arc<dyn BillingProfiles>,
    pub history: Arc<dyn HistoryStore>,
    pub dunning: Arc<dyn DunningLedger>,
    pub work_queue: Arc<dyn WorkQueue>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub tax: Arc<dyn TaxService>,
    pub notifier: Arc<dyn Notifier>,
    pub locks: Arc<dyn EntityLock>,
    pub clock: Arc<dyn Clock>,
}

pub struct BillingEngine {
    pub create_subscription: CreateSubscription,
    pub cancel_subscription: Arc<CancelSubscription>,
    pub pause_subscription: PauseSubscription,
    pub resume_subscription: Arc<ResumeSubscription>,
    pub change_plan: ChangePlan,
    pub close_period: Arc<ClosePeriod>,
    pub void_invoice: VoidInvoice,
    pub issue_credit: IssueCredit,
    pub ingest_usage: IngestUsage,
    pub collect_invoice: Arc<CollectInvoicePayment>,
    pub reconcile_payments: Arc<ReconcilePayments>,
    pub billing_cycle_sweep: BillingCycleSweep,
    pub payment_retry_sweep: PaymentRetrySweep,
    pub dunning_sweep: DunningSweep,
    pub pause_expiry_sweep: PauseExpirySweep,
    sweep_interval: Duration,
}

impl BillingEngine {
    pub fn new(ports: EnginePorts, config: &BillingConfig) -> Self {
        let assembler = Arc::new(InvoiceAssembler::new(
            ports.invoices.clone(),
            ports.attempts.clone(),
            ports.credits.clone(),
            ports.tax.clone(),
            config.due_days,
        ));

        let create_subscription = CreateSubscription::new(
            ports.subscriptions.clone(),
            ports.plans.clone(),
            ports.profiles.clone(),
            ports.dunning.clone(),
            ports.history.clone(),
            ports.clock.clone(),
        );
        let cancel_subscription = Arc::new(CancelSubscription::new(
            ports.subscriptions.clone(),
            ports.history.clone(),
            ports.locks.clone(),
            ports.clock.clone(),
        ));
        let pause_subscription = PauseSubscription::new(
            ports.subscriptions.clone(),
            ports.history.clone(),
            ports.locks.clone(),
            ports.clock.clone(),
        );
        let resume_subscription = Arc::new(ResumeSubscription::new(
            ports.subscriptions.clone(),
            ports.plans.clone(),
            ports.history.clone(),
            ports.locks.clone(),
            ports.clock.clone(),
        ));
        let change_plan = ChangePlan::new(
            ports.subscriptions.clone(),
            ports.plans.clone(),
            ports.profiles.clone(),
            ports.history.clone(),
            ports.locks.clone(),
            assembler.clone(),
            ports.clock.clone(),
        );
        let close_period = Arc::new(ClosePeriod::new(
            ports.subscriptions.clone(),
            ports.plans.clone(),
            ports.invoices.clone(),
            ports.usage.clone(),
            ports.profiles.clone(),
            ports.history.clone(),
            ports.locks.clone(),
            ports.notifier.clone(),
            assembler.clone(),
            ports.clock.clone(),
        ));
        let void_invoice = VoidInvoice::new(
            ports.invoices.clone(),
            ports.credits.clone(),
            ports.locks.clone(),
            ports.clock.clone(),
        );
        let issue_credit = IssueCredit::new(
            ports.credits.clone(),
            ports.profiles.clone(),
            ports.clock.clone(),
        );
        let ingest_usage = IngestUsage::new(
            ports.subscriptions.clone(),
            ports.plans.clone(),
            ports.usage.clone(),
            ports.profiles.clone(),
            ports.locks.clone(),
            assembler.clone(),
            ports.clock.clone(),
            config.grace_days,
        );
        let collect_invoice = Arc::new(CollectInvoicePayment::new(
            ports.invoices.clone(),
            ports.attempts.clone(),
            ports.subscriptions.clone(),
            ports.profiles.clone(),
            ports.gateway.clone(),
            ports.dunning.clone(),
            ports.work_queue.clone(),
            ports.notifier.clone(),
            ports.history.clone(),
            ports.locks.clone(),
            ports.clock.clone(),
        ));
        let reconcile_payments = Arc::new(ReconcilePayments::new(
            ports.invoices.clone(),
            ports.attempts.clone(),
            ports.gateway.clone(),
            ports.dunning.clone(),
            ports.notifier.clone(),
            ports.locks.clone(),
            ports.clock.clone(),
        ));

        let billing_cycle_sweep = BillingCycleSweep::new(
            ports.subscriptions.clone(),
            close_period.clone(),
            collect_invoice.clone(),
            ports.clock.clone(),
        );
        let payment_retry_sweep = PaymentRetrySweep::new(
            ports.work_queue.clone(),
            ports.attempts.clone(),
            collect_invoice.clone(),
            reconcile_payments.clone(),
            ports.clock.clone(),
        );
        let dunning_sweep = DunningSweep::new(
            ports.invoices.clone(),
            ports.dunning.clone(),
            ports.notifier.clone(),
            ports.clock.clone(),
        );
        let pause_expiry_sweep = PauseExpirySweep::new(
            ports.subscriptions.clone(),
            resume_subscription.clone(),
            cancel_subscription.clone(),
            ports.notifier.clone(),
            ports.clock.clone(),
            config.max_pause_days,
        );

        Self {
            create_subscription,
            cancel_subscription,
            pause_subscription,
            resume_subscription,
            change_plan,
            close_period,
            void_invoice,
            issue_credit,
            ingest_usage,
            collect_invoice,
            reconcile_payments,
            billing_cycle_sweep,
            payment_retry_sweep,
            dunning_sweep,
            pause_expiry_sweep,
            sweep_interval: Duration::from_secs(config.sweep_interval_secs),
        }
    }

    /// Runs every sweep once, concurrently. Billing-cycle work lands
    /// before the retry sweep drains the queue it may have fed, but the
    /// sweeps are safe in any interleaving.
    pub async fn run_sweeps_once(&self) {
        let (billing, retry, dunning, pause) = futures::join!(
            self.billing_cycle_sweep.run(),
            self.payment_retry_sweep.run(),
            self.dunning_sweep.run(),
            self.pause_expiry_sweep.run(),
        );
        info!(
            billing_processed = billing.processed,
            retry_processed = retry.processed,
            dunning_processed = dunning.processed,
            pause_processed = pause.processed,
            "sweep pass complete"
        );
    }

    /// The daemon loop: one sweep pass per interval, forever.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.sweep_interval);
        loop {
            ticker.tick().await;
            self.run_sweeps_once().await;
        }
    }
}
