//! The billing-cycle sweep.
//!
//! Finds every billable subscription whose period boundary has passed,
//! closes the period, and immediately tries to collect the invoice it
//! produced. Collection failures are not sweep failures; the retry
//! schedule owns them from there.

use std::sync::Arc;
use tracing::{error, info};

use crate::application::handlers::billing::ClosePeriod;
use crate::application::handlers::payment::CollectInvoicePayment;
use crate::domain::invoice::InvoiceStatus;
use crate::ports::{Clock, SubscriptionRepository};

use super::SweepReport;

pub struct BillingCycleSweep {
    subscriptions: Arc<dyn SubscriptionRepository>,
    close_period: Arc<ClosePeriod>,
    collect: Arc<CollectInvoicePayment>,
    clock: Arc<dyn Clock>,
}

impl BillingCycleSweep {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        close_period: Arc<ClosePeriod>,
        collect: Arc<CollectInvoicePayment>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            subscriptions,
            close_period,
            collect,
            clock,
        }
    }

    pub async fn run(&self) -> SweepReport {
        let now = self.clock.now();
        let due = match self.subscriptions.list_due_for_close(now).await {
            Ok(due) => due,
            Err(err) => {
                error!(%err, "billing cycle sweep could not list due subscriptions");
                return SweepReport { processed: 0, failed: 1 };
            }
        };

        let mut report = SweepReport::default();
        for subscription in due {
            match self.close_period.execute(subscription.id()).await {
                Ok(Some(invoice)) if invoice.status() == InvoiceStatus::Open => {
                    report.ok();
                    if let Err(err) = self.collect.execute(invoice.id(), None).await {
                        error!(
                            subscription_id = %subscription.id(),
                            invoice_id = %invoice.id(),
                            %err,
                            "collection after period close failed"
                        );
                    }
                }
                Ok(_) => report.ok(),
                Err(err) => {
                    report.err();
                    error!(
                        subscription_id = %subscription.id(),
                        %err,
                        "period close failed, will retry next pass"
                    );
                }
            }
        }

        info!(
            processed = report.processed,
            failed = report.failed,
            "billing cycle sweep finished"
        );
        report
    }
}
