//! Voiding an invoice.
//!
//! Voids carry a reason and restore any account credits the invoice had
//! consumed, so a reissued invoice can draw them again.

use std::sync::Arc;
use tracing::info;

use crate::domain::foundation::{BillingError, ErrorCode, InvoiceId};
use crate::domain::invoice::{Credit, Invoice, LineItemKind};
use crate::ports::{Clock, CreditRepository, EntityLock, InvoiceRepository, LockScope};

pub struct VoidInvoice {
    invoices: Arc<dyn InvoiceRepository>,
    credits: Arc<dyn CreditRepository>,
    locks: Arc<dyn EntityLock>,
    clock: Arc<dyn Clock>,
}

impl VoidInvoice {
    pub fn new(
        invoices: Arc<dyn InvoiceRepository>,
        credits: Arc<dyn CreditRepository>,
        locks: Arc<dyn EntityLock>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            invoices,
            credits,
            locks,
            clock,
        }
    }

    pub async fn execute(
        &self,
        invoice_id: InvoiceId,
        reason: impl Into<String>,
    ) -> Result<Invoice, BillingError> {
        let _lease = self.locks.acquire(LockScope::Invoice(invoice_id)).await?;
        let now = self.clock.now();

        let mut invoice = self
            .invoices
            .find(invoice_id)
            .await?
            .ok_or_else(|| BillingError::not_found(ErrorCode::InvoiceNotFound, invoice_id))?;
        let reason = reason.into();
        invoice.void(reason.clone(), now)?;

        for line in invoice.lines() {
            if let LineItemKind::CreditApplied { credit_id } = line.kind {
                if let Some(credit) = self.credits.find(credit_id).await? {
                    let restored = Credit::from_parts(
                        credit.id(),
                        credit.account_id(),
                        credit.currency(),
                        credit.original_cents(),
                        credit.remaining_cents() + line.amount.cents().abs(),
                        credit.reason().to_string(),
                        credit.created_at(),
                    );
                    self.credits.save(&restored).await?;
                }
            }
        }

        self.invoices.save(&invoice).await?;
        info!(invoice_id = %invoice.id(), %reason, "invoice voided");
        Ok(invoice)
    }
}
