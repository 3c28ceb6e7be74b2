//! The dunning sweep.
//!
//! Walks open past-due invoices, derives each account's standing from its
//! oldest delinquency, and escalates the ledger when the derived level is
//! higher than the recorded one. Downgrades never happen here; clearing
//! is the settlement path's job, so a payment landing mid-sweep cannot be
//! overwritten.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::domain::foundation::AccountId;
use crate::domain::invoice::Invoice;
use crate::domain::payment::DunningLevel;
use crate::ports::{Clock, DunningLedger, InvoiceRepository, Notification, Notifier};

use super::SweepReport;

pub struct DunningSweep {
    invoices: Arc<dyn InvoiceRepository>,
    dunning: Arc<dyn DunningLedger>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl DunningSweep {
    pub fn new(
        invoices: Arc<dyn InvoiceRepository>,
        dunning: Arc<dyn DunningLedger>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            invoices,
            dunning,
            notifier,
            clock,
        }
    }

    pub async fn run(&self) -> SweepReport {
        let now = self.clock.now();
        let past_due = match self.invoices.list_open_past_due(now).await {
            Ok(past_due) => past_due,
            Err(err) => {
                error!(%err, "dunning sweep could not list past-due invoices");
                return SweepReport { processed: 0, failed: 1 };
            }
        };

        // Oldest delinquent invoice per account drives the level.
        let mut worst: HashMap<AccountId, &Invoice> = HashMap::new();
        for invoice in &past_due {
            let days = invoice.days_past_due(now).unwrap_or(0);
            let entry = worst.entry(invoice.account_id()).or_insert(invoice);
            if days > entry.days_past_due(now).unwrap_or(0) {
                *entry = invoice;
            }
        }

        let mut report = SweepReport::default();
        for (account_id, invoice) in worst {
            let target = DunningLevel::for_days_past_due(invoice.days_past_due(now));
            match self.escalate(account_id, invoice, target).await {
                Ok(()) => report.ok(),
                Err(err) => {
                    report.err();
                    error!(account_id = %account_id, %err, "dunning escalation failed");
                }
            }
        }

        info!(
            processed = report.processed,
            failed = report.failed,
            "dunning sweep finished"
        );
        report
    }

    async fn escalate(
        &self,
        account_id: AccountId,
        invoice: &Invoice,
        target: DunningLevel,
    ) -> Result<(), crate::domain::foundation::BillingError> {
        let current = self.dunning.level_for(account_id).await?;
        if target <= current {
            return Ok(());
        }
        self.dunning
            .set_level(account_id, target, self.clock.now())
            .await?;
        info!(
            account_id = %account_id,
            from = current.as_str(),
            to = target.as_str(),
            invoice_id = %invoice.id(),
            "account standing escalated"
        );
        let notification = match target {
            DunningLevel::Warning => Notification::AccountWarned {
                account_id,
                invoice_id: invoice.id(),
            },
            DunningLevel::Blocked => Notification::AccountBlocked {
                account_id,
                invoice_id: invoice.id(),
            },
            DunningLevel::Current => return Ok(()),
        };
        if let Err(err) = self.notifier.notify(notification).await {
            warn!(%err, "notification delivery failed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryDunningLedger, InMemoryInvoiceRepository, ManualClock, RecordingNotifier,
    };
    use crate::domain::foundation::{Currency, Money, SubscriptionId, Timestamp};
    use crate::domain::invoice::{InvoiceNumber, LineItem, LineItemKind};

    struct Fixture {
        sweep: DunningSweep,
        invoices: Arc<InMemoryInvoiceRepository>,
        dunning: Arc<InMemoryDunningLedger>,
        notifier: Arc<RecordingNotifier>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let invoices = Arc::new(InMemoryInvoiceRepository::new());
        let dunning = Arc::new(InMemoryDunningLedger::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let clock = Arc::new(ManualClock::at(Timestamp::now()));
        let sweep = DunningSweep::new(
            invoices.clone(),
            dunning.clone(),
            notifier.clone(),
            clock.clone(),
        );
        Fixture {
            sweep,
            invoices,
            dunning,
            notifier,
            clock,
        }
    }

    async fn overdue_invoice(f: &Fixture, account_id: AccountId) -> Invoice {
        let now = f.clock.now();
        let mut invoice = Invoice::draft(
            account_id,
            SubscriptionId::new(),
            Currency::usd(),
            now.minus_days(30),
            now,
            now,
        );
        invoice
            .push_line(LineItem::new(
                LineItemKind::RecurringCharge,
                "Pro plan",
                Money::from_cents(4900, Currency::usd()),
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
    async fn seven_days_past_due_warns() {
        let f = fixture();
        let account_id = AccountId::new();
        let invoice = overdue_invoice(&f, account_id).await;

        f.clock.advance_days(7);
        f.sweep.run().await;

        assert_eq!(
            f.dunning.level_for(account_id).await.unwrap(),
            DunningLevel::Warning
        );
        assert!(f.notifier.sent().iter().any(|n| matches!(
            n,
            Notification::AccountWarned { invoice_id, .. } if *invoice_id == invoice.id()
        )));
    }

    #[tokio::test]
    async fn fourteen_days_past_due_blocks() {
        let f = fixture();
        let account_id = AccountId::new();
        overdue_invoice(&f, account_id).await;

        f.clock.advance_days(14);
        f.sweep.run().await;

        assert!(f.dunning.level_for(account_id).await.unwrap().is_blocked());
        assert!(f
            .notifier
            .sent()
            .iter()
            .any(|n| matches!(n, Notification::AccountBlocked { .. })));
    }

    #[tokio::test]
    async fn below_threshold_stays_current_and_silent() {
        let f = fixture();
        let account_id = AccountId::new();
        overdue_invoice(&f, account_id).await;

        f.clock.advance_days(6);
        f.sweep.run().await;

        assert_eq!(
            f.dunning.level_for(account_id).await.unwrap(),
            DunningLevel::Current
        );
        assert!(f.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn rerun_does_not_renotify_at_the_same_level() {
        let f = fixture();
        let account_id = AccountId::new();
        overdue_invoice(&f, account_id).await;

        f.clock.advance_days(8);
        f.sweep.run().await;
        f.sweep.run().await;

        let warnings = f
            .notifier
            .sent()
            .iter()
            .filter(|n| matches!(n, Notification::AccountWarned { .. }))
            .count();
        assert_eq!(warnings, 1);
    }

    #[tokio::test]
    async fn sweep_never_downgrades() {
        let f = fixture();
        let account_id = AccountId::new();
        overdue_invoice(&f, account_id).await;
        f.dunning
            .set_level(account_id, DunningLevel::Blocked, f.clock.now())
            .await
            .unwrap();

        f.clock.advance_days(8);
        f.sweep.run().await;

        assert!(f.dunning.level_for(account_id).await.unwrap().is_blocked());
    }
}
