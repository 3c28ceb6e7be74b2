//! The payment-retry sweep.
//!
//! First reconciles any attempts left hanging by a gateway timeout, then
//! drains the work queue and replays each scheduled retry through the
//! collection handler. The deterministic retry key means a retry that
//! raced the notification path replays the gateway's recorded outcome
//! instead of charging again.

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::application::handlers::payment::{CollectInvoicePayment, ReconcilePayments};
use crate::domain::foundation::IdempotencyKey;
use crate::ports::{Clock, PaymentAttemptRepository, TaskKind, WorkQueue};

use super::SweepReport;

/// How long a retry task waits before the sweep tries it again after an
/// infrastructure failure.
const REQUEUE_DELAY_SECS: i64 = 3600;

pub struct PaymentRetrySweep {
    work_queue: Arc<dyn WorkQueue>,
    attempts: Arc<dyn PaymentAttemptRepository>,
    collect: Arc<CollectInvoicePayment>,
    reconcile: Arc<ReconcilePayments>,
    clock: Arc<dyn Clock>,
}

impl PaymentRetrySweep {
    pub fn new(
        work_queue: Arc<dyn WorkQueue>,
        attempts: Arc<dyn PaymentAttemptRepository>,
        collect: Arc<CollectInvoicePayment>,
        reconcile: Arc<ReconcilePayments>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            work_queue,
            attempts,
            collect,
            reconcile,
            clock,
        }
    }

    pub async fn run(&self) -> SweepReport {
        let mut report = SweepReport::default();
        self.reconcile_timeouts(&mut report).await;
        self.drain_due_retries(&mut report).await;
        info!(
            processed = report.processed,
            failed = report.failed,
            "payment retry sweep finished"
        );
        report
    }

    async fn reconcile_timeouts(&self, report: &mut SweepReport) {
        let flagged = match self.attempts.list_needing_reconciliation().await {
            Ok(flagged) => flagged,
            Err(err) => {
                error!(%err, "could not list attempts needing reconciliation");
                report.err();
                return;
            }
        };
        for attempt in flagged {
            let id = attempt.id();
            match self.reconcile.reconcile_attempt(attempt).await {
                Ok(()) => report.ok(),
                Err(err) => {
                    report.err();
                    // The flag stays set, so the next pass tries again.
                    warn!(attempt_id = %id, %err, "reconciliation deferred");
                }
            }
        }
    }

    async fn drain_due_retries(&self, report: &mut SweepReport) {
        let now = self.clock.now();
        let due = match self.work_queue.take_due(now).await {
            Ok(due) => due,
            Err(err) => {
                error!(%err, "could not drain the retry queue");
                report.err();
                return;
            }
        };
        for task in due {
            let TaskKind::PaymentRetry {
                invoice_id,
                attempt_number,
            } = task.kind.clone();
            let key = IdempotencyKey::for_payment_retry(&invoice_id, attempt_number);
            match self.collect.execute(invoice_id, Some(key)).await {
                Ok(_) => report.ok(),
                Err(err) => {
                    report.err();
                    error!(
                        invoice_id = %invoice_id,
                        attempt = attempt_number,
                        %err,
                        "scheduled retry failed, requeueing"
                    );
                    let mut requeued = task;
                    requeued.run_at = now.add_secs(REQUEUE_DELAY_SECS);
                    if let Err(err) = self.work_queue.schedule(requeued).await {
                        error!(invoice_id = %invoice_id, %err, "requeue failed, retry lost");
                    }
                }
            }
        }
    }
}
