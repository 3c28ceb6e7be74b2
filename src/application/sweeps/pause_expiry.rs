//! The pause-expiry sweep.
//!
//! Resumes paused subscriptions whose scheduled resume time has arrived,
//! and cancels those left paused past the cap so an abandoned pause does
//! not linger forever.

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::application::handlers::subscription::{CancelSubscription, ResumeSubscription};
use crate::ports::{Clock, Notification, Notifier, SubscriptionRepository};

use super::SweepReport;

pub struct PauseExpirySweep {
    subscriptions: Arc<dyn SubscriptionRepository>,
    resume: Arc<ResumeSubscription>,
    cancel: Arc<CancelSubscription>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    max_pause_days: i64,
}

impl PauseExpirySweep {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        resume: Arc<ResumeSubscription>,
        cancel: Arc<CancelSubscription>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        max_pause_days: i64,
    ) -> Self {
        Self {
            subscriptions,
            resume,
            cancel,
            notifier,
            clock,
            max_pause_days,
        }
    }

    pub async fn run(&self) -> SweepReport {
        let now = self.clock.now();
        let paused = match self.subscriptions.list_paused().await {
            Ok(paused) => paused,
            Err(err) => {
                error!(%err, "pause expiry sweep could not list paused subscriptions");
                return SweepReport { processed: 0, failed: 1 };
            }
        };

        let mut report = SweepReport::default();
        for subscription in paused {
            let id = subscription.id();

            let resume_due = subscription
                .pause_resumes_at()
                .is_some_and(|at| !now.is_before(&at));
            if resume_due {
                match self.resume.execute(id).await {
                    Ok(_) => {
                        report.ok();
                        info!(subscription_id = %id, "scheduled resume applied");
                    }
                    Err(err) => {
                        report.err();
                        error!(subscription_id = %id, %err, "scheduled resume failed");
                    }
                }
                continue;
            }

            let pause_expired = subscription
                .paused_at()
                .is_some_and(|at| !now.is_before(&at.add_days(self.max_pause_days)));
            if pause_expired {
                match self.cancel.execute(id, true).await {
                    Ok(_) => {
                        report.ok();
                        info!(
                            subscription_id = %id,
                            max_pause_days = self.max_pause_days,
                            "pause exceeded the cap, subscription cancelled"
                        );
                        let notification = Notification::SubscriptionCancelled {
                            account_id: subscription.account_id(),
                            subscription_id: id,
                            reason: "pause exceeded the maximum duration".into(),
                        };
                        if let Err(err) = self.notifier.notify(notification).await {
                            warn!(subscription_id = %id, %err, "cancellation notice failed");
                        }
                    }
                    Err(err) => {
                        report.err();
                        error!(subscription_id = %id, %err, "pause expiry cancel failed");
                    }
                }
            }
        }

        info!(
            processed = report.processed,
            failed = report.failed,
            "pause expiry sweep finished"
        );
        report
    }
}
