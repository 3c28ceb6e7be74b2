//! Draft-to-open invoice finalization.
//!
//! Every path that produces an invoice (period close, immediate plan
//! change, late usage) funnels through here so tax assessment, credit
//! application, numbering, and zero-due settlement behave identically.

use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::foundation::{BillingError, IdempotencyKey, Money, Timestamp};
use crate::domain::invoice::{apply_credits, Invoice, InvoiceNumber, LineItem, LineItemKind};
use crate::domain::payment::PaymentAttempt;
use crate::ports::{
    BillingProfile, CreditRepository, InvoiceRepository, PaymentAttemptRepository, TaxError,
    TaxRequest, TaxService,
};

pub struct InvoiceAssembler {
    invoices: Arc<dyn InvoiceRepository>,
    attempts: Arc<dyn PaymentAttemptRepository>,
    credits: Arc<dyn CreditRepository>,
    tax: Arc<dyn TaxService>,
    /// Days between finalization and the due date.
    due_days: i64,
}

impl InvoiceAssembler {
    pub fn new(
        invoices: Arc<dyn InvoiceRepository>,
        attempts: Arc<dyn PaymentAttemptRepository>,
        credits: Arc<dyn CreditRepository>,
        tax: Arc<dyn TaxService>,
        due_days: i64,
    ) -> Self {
        Self {
            invoices,
            attempts,
            credits,
            tax,
            due_days,
        }
    }

    /// Finalizes a draft: assesses tax, applies account credits oldest
    /// first, assigns the sequential number and due date, and persists.
    ///
    /// A tax outage does not block finalization; the invoice goes out
    /// untaxed and flagged for review.
    pub async fn finalize(
        &self,
        invoice: &mut Invoice,
        profile: &BillingProfile,
        now: Timestamp,
    ) -> Result<(), BillingError> {
        let pre_tax = invoice.amount_due();
        if !pre_tax.is_zero() && !profile.tax_exempt {
            match self
                .tax
                .assess(&TaxRequest {
                    jurisdiction: profile.jurisdiction.clone(),
                    taxable_cents: pre_tax.cents(),
                    currency: invoice.currency(),
                })
                .await
            {
                Ok(assessment) if assessment.tax_cents > 0 => {
                    invoice.push_line(LineItem::new(
                        LineItemKind::Tax,
                        assessment.description,
                        Money::from_cents(assessment.tax_cents, invoice.currency()),
                    ))?;
                }
                Ok(_) => {}
                Err(TaxError::Unavailable(reason)) => {
                    warn!(
                        invoice_id = %invoice.id(),
                        %reason,
                        "tax service unavailable, finalizing untaxed for review"
                    );
                    invoice.flag_tax_review();
                }
                Err(err @ TaxError::Rejected(_)) => return Err(err.into()),
            }
        }

        let due = invoice.amount_due();
        if !due.is_zero() {
            let mut available = self.credits.list_available(invoice.account_id()).await?;
            let draws = apply_credits(&mut available, due.cents(), invoice.currency());
            for draw in &draws {
                invoice.push_line(LineItem::new(
                    LineItemKind::CreditApplied {
                        credit_id: draw.credit_id,
                    },
                    "Account credit",
                    Money::from_cents(-draw.cents, invoice.currency()),
                ))?;
            }
            if !draws.is_empty() {
                self.credits.save_all(&available).await?;
            }
        }

        let sequence = self.invoices.next_invoice_number().await?;
        let number = InvoiceNumber::from_sequence(sequence)?;
        invoice.finalize(number, now.add_days(self.due_days), now)?;
        self.invoices.save(invoice).await?;

        info!(
            invoice_id = %invoice.id(),
            number = %number,
            amount_due = %invoice.amount_due(),
            supplemental = invoice.is_supplemental(),
            "invoice finalized"
        );
        Ok(())
    }

    /// Settles a finalized invoice whose credits covered everything. A
    /// synthetic succeeded attempt is recorded so the "paid implies a
    /// succeeded attempt" invariant holds without a gateway round trip.
    pub async fn settle_if_zero_due(
        &self,
        invoice: &mut Invoice,
        now: Timestamp,
    ) -> Result<bool, BillingError> {
        if !invoice.is_zero_due() {
            return Ok(false);
        }
        let failed = self.attempts.count_failed(invoice.id()).await?;
        let mut attempt = PaymentAttempt::open(
            invoice.id(),
            invoice.account_id(),
            failed + 1,
            IdempotencyKey::generate(),
            invoice.amount_due(),
            now,
        );
        attempt.succeed("credit-settled", now)?;
        self.attempts.save(&attempt).await?;
        invoice.record_payment(now)?;
        self.invoices.save(invoice).await?;
        info!(invoice_id = %invoice.id(), "zero-due invoice settled");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        FlatRateTaxService, InMemoryCreditRepository, InMemoryInvoiceRepository,
        InMemoryPaymentAttemptRepository,
    };
    use crate::domain::foundation::{AccountId, Currency, Money, SubscriptionId};
    use crate::domain::invoice::{Credit, InvoiceStatus};
    use crate::ports::BillingProfile;

    fn profile(account_id: AccountId) -> BillingProfile {
        BillingProfile {
            account_id,
            jurisdiction: "US-NY".into(),
            tax_exempt: false,
            vat_id: None,
            payment_method: Some("pm_test".into()),
        }
    }

    struct Fixture {
        invoices: Arc<InMemoryInvoiceRepository>,
        attempts: Arc<InMemoryPaymentAttemptRepository>,
        credits: Arc<InMemoryCreditRepository>,
        tax: Arc<FlatRateTaxService>,
        assembler: InvoiceAssembler,
    }

    fn fixture() -> Fixture {
        let invoices = Arc::new(InMemoryInvoiceRepository::new());
        let attempts = Arc::new(InMemoryPaymentAttemptRepository::new());
        let credits = Arc::new(InMemoryCreditRepository::new());
        let tax = Arc::new(FlatRateTaxService::new(1000));
        let assembler = InvoiceAssembler::new(
            invoices.clone(),
            attempts.clone(),
            credits.clone(),
            tax.clone(),
            0,
        );
        Fixture {
            invoices,
            attempts,
            credits,
            tax,
            assembler,
        }
    }

    fn draft(account_id: AccountId, cents: i64) -> Invoice {
        let now = Timestamp::now();
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
                Money::from_cents(cents, Currency::usd()),
            ))
            .unwrap();
        invoice
    }

    #[tokio::test]
    async fn finalize_adds_tax_number_and_due_date() {
        let f = fixture();
        let account = AccountId::new();
        let mut invoice = draft(account, 4900);

        f.assembler
            .finalize(&mut invoice, &profile(account), Timestamp::now())
            .await
            .unwrap();

        assert_eq!(invoice.status(), InvoiceStatus::Open);
        assert_eq!(invoice.number().unwrap().sequence(), 1);
        // 49.00 + 10% tax.
        assert_eq!(invoice.amount_due().cents(), 5390);
        assert!(invoice.due_at().is_some());
    }

    #[tokio::test]
    async fn tax_outage_degrades_and_flags() {
        let f = fixture();
        f.tax.set_unavailable(true);
        let account = AccountId::new();
        let mut invoice = draft(account, 4900);

        f.assembler
            .finalize(&mut invoice, &profile(account), Timestamp::now())
            .await
            .unwrap();

        assert_eq!(invoice.status(), InvoiceStatus::Open);
        assert!(invoice.needs_tax_review());
        assert_eq!(invoice.amount_due().cents(), 4900);
    }

    #[tokio::test]
    async fn credits_apply_oldest_first_and_persist() {
        let f = fixture();
        let account = AccountId::new();
        let old = Credit::issue(account, 1000, Currency::usd(), "goodwill", Timestamp::now())
            .unwrap();
        f.credits.save(&old).await.unwrap();

        let mut invoice = draft(account, 4900);
        f.assembler
            .finalize(&mut invoice, &profile(account), Timestamp::now())
            .await
            .unwrap();

        // 49.00 + 4.90 tax - 10.00 credit.
        assert_eq!(invoice.amount_due().cents(), 4390);
        let stored = f.credits.find(old.id()).await.unwrap().unwrap();
        assert!(stored.is_exhausted());
    }

    #[tokio::test]
    async fn fully_credited_invoice_settles_without_gateway() {
        let f = fixture();
        let account = AccountId::new();
        let credit = Credit::issue(account, 100_000, Currency::usd(), "migration", Timestamp::now())
            .unwrap();
        f.credits.save(&credit).await.unwrap();

        let mut invoice = draft(account, 4900);
        let now = Timestamp::now();
        f.assembler
            .finalize(&mut invoice, &profile(account), now)
            .await
            .unwrap();
        assert!(invoice.is_zero_due());

        let settled = f.assembler.settle_if_zero_due(&mut invoice, now).await.unwrap();
        assert!(settled);
        assert_eq!(invoice.status(), InvoiceStatus::Paid);

        let attempts = f.attempts.list_for_invoice(invoice.id()).await.unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].transaction_ref(), Some("credit-settled"));

        let reloaded = f.invoices.find(invoice.id()).await.unwrap().unwrap();
        assert_eq!(reloaded.status(), InvoiceStatus::Paid);
    }

    #[tokio::test]
    async fn nonzero_invoice_does_not_settle() {
        let f = fixture();
        let account = AccountId::new();
        let mut invoice = draft(account, 4900);
        f.assembler
            .finalize(&mut invoice, &profile(account), Timestamp::now())
            .await
            .unwrap();
        let settled = f
            .assembler
            .settle_if_zero_due(&mut invoice, Timestamp::now())
            .await
            .unwrap();
        assert!(!settled);
        assert_eq!(invoice.status(), InvoiceStatus::Open);
    }
}
