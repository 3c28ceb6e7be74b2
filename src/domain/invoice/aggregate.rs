//! The invoice aggregate.
//!
//! An invoice is mutable only while `Draft`. Finalizing assigns the
//! sequential number and due date and freezes the line items; corrections
//! afterwards go through voiding and reissue, never edits.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    AccountId, BillingError, CreditId, Currency, ErrorCode, InvoiceId, Money, StateMachine,
    SubscriptionId, Timestamp,
};

use super::number::InvoiceNumber;
use super::status::InvoiceStatus;

/// What a line item bills for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LineItemKind {
    RecurringCharge,
    ProrationCredit,
    ProrationCharge,
    Usage { metric: String },
    Tax,
    CreditApplied { credit_id: CreditId },
}

/// One line of an invoice. Credits carry negative amounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub kind: LineItemKind,
    pub description: String,
    pub amount: Money,
}

impl LineItem {
    pub fn new(kind: LineItemKind, description: impl Into<String>, amount: Money) -> Self {
        Self {
            kind,
            description: description.into(),
            amount,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    id: InvoiceId,
    account_id: AccountId,
    subscription_id: SubscriptionId,
    status: InvoiceStatus,
    number: Option<InvoiceNumber>,
    currency: Currency,
    period_start: Timestamp,
    period_end: Timestamp,
    supplemental: bool,
    needs_tax_review: bool,
    lines: Vec<LineItem>,
    created_at: Timestamp,
    finalized_at: Option<Timestamp>,
    due_at: Option<Timestamp>,
    paid_at: Option<Timestamp>,
    voided_at: Option<Timestamp>,
    void_reason: Option<String>,
}

impl Invoice {
    /// Opens an empty draft for a billing period.
    pub fn draft(
        account_id: AccountId,
        subscription_id: SubscriptionId,
        currency: Currency,
        period_start: Timestamp,
        period_end: Timestamp,
        now: Timestamp,
    ) -> Self {
        Self {
            id: InvoiceId::new(),
            account_id,
            subscription_id,
            status: InvoiceStatus::Draft,
            number: None,
            currency,
            period_start,
            period_end,
            supplemental: false,
            needs_tax_review: false,
            lines: Vec::new(),
            created_at: now,
            finalized_at: None,
            due_at: None,
            paid_at: None,
            voided_at: None,
            void_reason: None,
        }
    }

    /// Opens a draft for late usage against an already-closed period.
    pub fn draft_supplemental(
        account_id: AccountId,
        subscription_id: SubscriptionId,
        currency: Currency,
        period_start: Timestamp,
        period_end: Timestamp,
        now: Timestamp,
    ) -> Self {
        let mut invoice = Self::draft(
            account_id,
            subscription_id,
            currency,
            period_start,
            period_end,
            now,
        );
        invoice.supplemental = true;
        invoice
    }

    // -- accessors ---------------------------------------------------------

    pub fn id(&self) -> InvoiceId {
        self.id
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    pub fn subscription_id(&self) -> SubscriptionId {
        self.subscription_id
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn number(&self) -> Option<InvoiceNumber> {
        self.number
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn period_start(&self) -> Timestamp {
        self.period_start
    }

    pub fn period_end(&self) -> Timestamp {
        self.period_end
    }

    pub fn is_supplemental(&self) -> bool {
        self.supplemental
    }

    pub fn needs_tax_review(&self) -> bool {
        self.needs_tax_review
    }

    pub fn lines(&self) -> &[LineItem] {
        &self.lines
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn finalized_at(&self) -> Option<Timestamp> {
        self.finalized_at
    }

    pub fn due_at(&self) -> Option<Timestamp> {
        self.due_at
    }

    pub fn paid_at(&self) -> Option<Timestamp> {
        self.paid_at
    }

    pub fn voided_at(&self) -> Option<Timestamp> {
        self.voided_at
    }

    pub fn void_reason(&self) -> Option<&str> {
        self.void_reason.as_deref()
    }

    /// Signed sum of all line items.
    pub fn total(&self) -> Money {
        let cents = self
            .lines
            .iter()
            .fold(0i64, |acc, line| acc.saturating_add(line.amount.cents()));
        Money::from_cents(cents, self.currency)
    }

    /// What the customer owes: the total floored at zero. A downgrade
    /// proration credit can push the raw total negative; the excess stays
    /// as an account credit rather than a negative invoice.
    pub fn amount_due(&self) -> Money {
        let total = self.total();
        if total.is_negative() {
            Money::zero(self.currency)
        } else {
            total
        }
    }

    pub fn is_zero_due(&self) -> bool {
        self.amount_due().is_zero()
    }

    /// Days this invoice has been past due at `now`, negative before the
    /// due date. `None` until finalized.
    pub fn days_past_due(&self, now: Timestamp) -> Option<i64> {
        self.due_at.map(|due| now.whole_days_since(&due))
    }

    // -- mutations ---------------------------------------------------------

    /// Appends a line item. Only drafts accept lines.
    ///
    /// # Errors
    ///
    /// `InvoiceFinalized` once the invoice has left `Draft`; a validation
    /// error on currency mismatch.
    pub fn push_line(&mut self, line: LineItem) -> Result<(), BillingError> {
        if self.status != InvoiceStatus::Draft {
            return Err(BillingError::new(
                ErrorCode::InvoiceFinalized,
                format!("invoice {} is {} and cannot be modified", self.id, self.status.as_str()),
            ));
        }
        if line.amount.currency() != self.currency {
            return Err(BillingError::validation(
                "amount",
                format!(
                    "line currency {} does not match invoice currency {}",
                    line.amount.currency(),
                    self.currency
                ),
            ));
        }
        self.lines.push(line);
        Ok(())
    }

    /// Flags the invoice for manual tax review when assessment was
    /// unavailable at finalization time.
    pub fn flag_tax_review(&mut self) {
        self.needs_tax_review = true;
    }

    /// Finalizes the draft: assigns the sequential number, sets the due
    /// date, and freezes the line items.
    pub fn finalize(
        &mut self,
        number: InvoiceNumber,
        due_at: Timestamp,
        now: Timestamp,
    ) -> Result<(), BillingError> {
        self.status = self.status.transition_to(InvoiceStatus::Open)?;
        self.number = Some(number);
        self.finalized_at = Some(now);
        self.due_at = Some(due_at);
        Ok(())
    }

    /// Marks the invoice paid after a recorded successful attempt (or a
    /// full credit settlement).
    pub fn record_payment(&mut self, now: Timestamp) -> Result<(), BillingError> {
        self.status = self.status.transition_to(InvoiceStatus::Paid)?;
        self.paid_at = Some(now);
        Ok(())
    }

    /// Voids the invoice with a reason. Paid invoices cannot be voided.
    pub fn void(&mut self, reason: impl Into<String>, now: Timestamp) -> Result<(), BillingError> {
        self.status = self.status.transition_to(InvoiceStatus::Void)?;
        self.voided_at = Some(now);
        self.void_reason = Some(reason.into());
        Ok(())
    }
}
