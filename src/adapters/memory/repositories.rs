//! In-memory repositories.
//!
//! Backed by mutex-guarded maps. Used by tests and by local runs without
//! a database; behavior mirrors the Postgres adapters including the
//! gapless invoice number sequence.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::foundation::{
    AccountId, BillingError, CreditId, IdempotencyKey, InvoiceId, PaymentAttemptId, PlanFamilyId,
    PlanVersionId, SubscriptionId, Timestamp,
};
use crate::domain::invoice::{Credit, Invoice, InvoiceStatus};
use crate::domain::payment::{AttemptStatus, PaymentAttempt};
use crate::domain::plan::PlanVersion;
use crate::domain::subscription::{HistoryRecord, Subscription, SubscriptionStatus};
use crate::ports::{
    BillingProfile, BillingProfiles, CreditRepository, HistoryStore, InvoiceRepository,
    PaymentAttemptRepository, PlanRepository, SubscriptionRepository,
};

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
pub struct InMemorySubscriptionRepository {
    rows: Mutex<HashMap<SubscriptionId, Subscription>>,
}

impl InMemorySubscriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepository {
    async fn find(&self, id: SubscriptionId) -> Result<Option<Subscription>, BillingError> {
        Ok(guard(&self.rows).get(&id).cloned())
    }

    async fn save(&self, subscription: &Subscription) -> Result<(), BillingError> {
        guard(&self.rows).insert(subscription.id(), subscription.clone());
        Ok(())
    }

    async fn list_by_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Subscription>, BillingError> {
        let mut rows: Vec<_> = guard(&self.rows)
            .values()
            .filter(|s| s.account_id() == account_id)
            .cloned()
            .collect();
        rows.sort_by_key(|s| s.created_at());
        Ok(rows)
    }

    async fn list_due_for_close(
        &self,
        now: Timestamp,
    ) -> Result<Vec<Subscription>, BillingError> {
        let mut rows: Vec<_> = guard(&self.rows)
            .values()
            .filter(|s| s.is_due_for_close(now))
            .cloned()
            .collect();
        rows.sort_by_key(|s| s.period_end());
        Ok(rows)
    }

    async fn list_paused(&self) -> Result<Vec<Subscription>, BillingError> {
        let mut rows: Vec<_> = guard(&self.rows)
            .values()
            .filter(|s| s.status() == SubscriptionStatus::Paused)
            .cloned()
            .collect();
        rows.sort_by_key(|s| s.paused_at());
        Ok(rows)
    }
}

#[derive(Default)]
pub struct InMemoryPlanRepository {
    rows: Mutex<HashMap<PlanVersionId, PlanVersion>>,
}

impl InMemoryPlanRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlanRepository for InMemoryPlanRepository {
    async fn find(&self, id: PlanVersionId) -> Result<Option<PlanVersion>, BillingError> {
        Ok(guard(&self.rows).get(&id).cloned())
    }

    async fn save(&self, plan: &PlanVersion) -> Result<(), BillingError> {
        guard(&self.rows).insert(plan.id(), plan.clone());
        Ok(())
    }

    async fn list_family(
        &self,
        family: PlanFamilyId,
    ) -> Result<Vec<PlanVersion>, BillingError> {
        let mut rows: Vec<_> = guard(&self.rows)
            .values()
            .filter(|p| p.family() == family)
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.version());
        Ok(rows)
    }
}

#[derive(Default)]
pub struct InMemoryInvoiceRepository {
    rows: Mutex<HashMap<InvoiceId, Invoice>>,
    sequence: AtomicU64,
}

impl InMemoryInvoiceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InvoiceRepository for InMemoryInvoiceRepository {
    async fn find(&self, id: InvoiceId) -> Result<Option<Invoice>, BillingError> {
        Ok(guard(&self.rows).get(&id).cloned())
    }

    async fn save(&self, invoice: &Invoice) -> Result<(), BillingError> {
        guard(&self.rows).insert(invoice.id(), invoice.clone());
        Ok(())
    }

    async fn next_invoice_number(&self) -> Result<u64, BillingError> {
        Ok(self.sequence.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn find_period_invoice(
        &self,
        subscription_id: SubscriptionId,
        period_start: Timestamp,
    ) -> Result<Option<Invoice>, BillingError> {
        Ok(guard(&self.rows)
            .values()
            .find(|i| {
                i.subscription_id() == subscription_id
                    && i.period_start() == period_start
                    && !i.is_supplemental()
                    && i.status() != InvoiceStatus::Void
            })
            .cloned())
    }

    async fn list_open_past_due(&self, now: Timestamp) -> Result<Vec<Invoice>, BillingError> {
        let mut rows: Vec<_> = guard(&self.rows)
            .values()
            .filter(|i| {
                i.status() == InvoiceStatus::Open
                    && i.due_at().map(|due| due.is_before(&now)).unwrap_or(false)
            })
            .cloned()
            .collect();
        rows.sort_by_key(|i| i.due_at());
        Ok(rows)
    }

    async fn list_open_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Invoice>, BillingError> {
        let mut rows: Vec<_> = guard(&self.rows)
            .values()
            .filter(|i| i.account_id() == account_id && i.status() == InvoiceStatus::Open)
            .cloned()
            .collect();
        rows.sort_by_key(|i| i.due_at());
        Ok(rows)
    }

    async fn list_for_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Vec<Invoice>, BillingError> {
        let mut rows: Vec<_> = guard(&self.rows)
            .values()
            .filter(|i| i.subscription_id() == subscription_id)
            .cloned()
            .collect();
        rows.sort_by_key(|i| i.created_at());
        Ok(rows)
    }
}

#[derive(Default)]
pub struct InMemoryPaymentAttemptRepository {
    rows: Mutex<HashMap<PaymentAttemptId, PaymentAttempt>>,
}

impl InMemoryPaymentAttemptRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentAttemptRepository for InMemoryPaymentAttemptRepository {
    async fn find(&self, id: PaymentAttemptId) -> Result<Option<PaymentAttempt>, BillingError> {
        Ok(guard(&self.rows).get(&id).cloned())
    }

    async fn save(&self, attempt: &PaymentAttempt) -> Result<(), BillingError> {
        guard(&self.rows).insert(attempt.id(), attempt.clone());
        Ok(())
    }

    async fn find_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<PaymentAttempt>, BillingError> {
        Ok(guard(&self.rows)
            .values()
            .find(|a| a.idempotency_key() == key)
            .cloned())
    }

    async fn list_for_invoice(
        &self,
        invoice_id: InvoiceId,
    ) -> Result<Vec<PaymentAttempt>, BillingError> {
        let mut rows: Vec<_> = guard(&self.rows)
            .values()
            .filter(|a| a.invoice_id() == invoice_id)
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.attempt_number());
        Ok(rows)
    }

    async fn count_failed(&self, invoice_id: InvoiceId) -> Result<u32, BillingError> {
        Ok(guard(&self.rows)
            .values()
            .filter(|a| a.invoice_id() == invoice_id && a.status() == AttemptStatus::Failed)
            .count() as u32)
    }

    async fn list_needing_reconciliation(&self) -> Result<Vec<PaymentAttempt>, BillingError> {
        let mut rows: Vec<_> = guard(&self.rows)
            .values()
            .filter(|a| a.needs_reconciliation())
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.created_at());
        Ok(rows)
    }
}

#[derive(Default)]
pub struct InMemoryCreditRepository {
    rows: Mutex<HashMap<CreditId, Credit>>,
}

impl InMemoryCreditRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CreditRepository for InMemoryCreditRepository {
    async fn find(&self, id: CreditId) -> Result<Option<Credit>, BillingError> {
        Ok(guard(&self.rows).get(&id).cloned())
    }

    async fn save(&self, credit: &Credit) -> Result<(), BillingError> {
        guard(&self.rows).insert(credit.id(), credit.clone());
        Ok(())
    }

    async fn save_all(&self, credits: &[Credit]) -> Result<(), BillingError> {
        let mut rows = guard(&self.rows);
        for credit in credits {
            rows.insert(credit.id(), credit.clone());
        }
        Ok(())
    }

    async fn list_available(&self, account_id: AccountId) -> Result<Vec<Credit>, BillingError> {
        let mut rows: Vec<_> = guard(&self.rows)
            .values()
            .filter(|c| c.account_id() == account_id && !c.is_exhausted())
            .cloned()
            .collect();
        rows.sort_by_key(|c| c.created_at());
        Ok(rows)
    }
}

#[derive(Default)]
pub struct InMemoryHistoryStore {
    rows: Mutex<Vec<HistoryRecord>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(&self, record: HistoryRecord) -> Result<(), BillingError> {
        guard(&self.rows).push(record);
        Ok(())
    }

    async fn list_for(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Vec<HistoryRecord>, BillingError> {
        Ok(guard(&self.rows)
            .iter()
            .filter(|r| r.subscription_id == subscription_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryBillingProfiles {
    rows: Mutex<HashMap<AccountId, BillingProfile>>,
}

impl InMemoryBillingProfiles {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BillingProfiles for InMemoryBillingProfiles {
    async fn find(&self, account_id: AccountId) -> Result<Option<BillingProfile>, BillingError> {
        Ok(guard(&self.rows).get(&account_id).cloned())
    }

    async fn save(&self, profile: &BillingProfile) -> Result<(), BillingError> {
        guard(&self.rows).insert(profile.account_id, profile.clone());
        Ok(())
    }
}
