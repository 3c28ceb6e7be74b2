//! PostgreSQL implementation of InvoiceRepository.
//!
//! Invoice numbers come from a database sequence, which makes the
//! sequence gapless-per-claim and safe under concurrent finalization.

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::domain::foundation::{
    AccountId, BillingError, ErrorCode, InvoiceId, SubscriptionId, Timestamp,
};
use crate::domain::invoice::Invoice;
use crate::ports::InvoiceRepository;

#[derive(Clone)]
pub struct PostgresInvoiceRepository {
    pool: PgPool,
}

impl PostgresInvoiceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_err(context: &str, err: impl std::fmt::Display) -> BillingError {
    BillingError::new(ErrorCode::DatabaseError, format!("{}: {}", context, err))
}

fn decode(body: &str) -> Result<Invoice, BillingError> {
    serde_json::from_str(body).map_err(|e| db_err("corrupt invoice row", e))
}

fn encode(invoice: &Invoice) -> Result<String, BillingError> {
    serde_json::to_string(invoice).map_err(|e| db_err("serialize invoice", e))
}

#[async_trait]
impl InvoiceRepository for PostgresInvoiceRepository {
    async fn find(&self, id: InvoiceId) -> Result<Option<Invoice>, BillingError> {
        let row = sqlx::query("SELECT body FROM invoices WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_err("fetch invoice", e))?;
        row.map(|r| decode(r.get::<&str, _>("body"))).transpose()
    }

    async fn save(&self, invoice: &Invoice) -> Result<(), BillingError> {
        sqlx::query(
            r#"
            INSERT INTO invoices
                (id, account_id, subscription_id, status, period_start, due_at,
                 supplemental, body)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                due_at = EXCLUDED.due_at,
                body = EXCLUDED.body
            "#,
        )
        .bind(invoice.id().as_uuid())
        .bind(invoice.account_id().as_uuid())
        .bind(invoice.subscription_id().as_uuid())
        .bind(invoice.status().as_str())
        .bind(invoice.period_start().as_datetime())
        .bind(invoice.due_at().map(|t| *t.as_datetime()))
        .bind(invoice.is_supplemental())
        .bind(encode(invoice)?)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("save invoice", e))?;
        Ok(())
    }

    async fn next_invoice_number(&self) -> Result<u64, BillingError> {
        let row = sqlx::query("SELECT nextval('invoice_numbers') AS seq")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_err("claim invoice number", e))?;
        let seq: i64 = row.get("seq");
        u64::try_from(seq).map_err(|e| db_err("invoice number overflow", e))
    }

    async fn find_period_invoice(
        &self,
        subscription_id: SubscriptionId,
        period_start: Timestamp,
    ) -> Result<Option<Invoice>, BillingError> {
        let row = sqlx::query(
            r#"
            SELECT body FROM invoices
            WHERE subscription_id = $1 AND period_start = $2
              AND NOT supplemental AND status <> 'void'
            LIMIT 1
            "#,
        )
        .bind(subscription_id.as_uuid())
        .bind(period_start.as_datetime())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("fetch period invoice", e))?;
        row.map(|r| decode(r.get::<&str, _>("body"))).transpose()
    }

    async fn list_open_past_due(&self, now: Timestamp) -> Result<Vec<Invoice>, BillingError> {
        let rows = sqlx::query(
            r#"
            SELECT body FROM invoices
            WHERE status = 'open' AND due_at < $1
            ORDER BY due_at
            "#,
        )
        .bind(now.as_datetime())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("list past-due invoices", e))?;
        rows.iter().map(|r| decode(r.get::<&str, _>("body"))).collect()
    }

    async fn list_open_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Invoice>, BillingError> {
        let rows = sqlx::query(
            r#"
            SELECT body FROM invoices
            WHERE status = 'open' AND account_id = $1
            ORDER BY due_at NULLS LAST
            "#,
        )
        .bind(account_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("list open invoices", e))?;
        rows.iter().map(|r| decode(r.get::<&str, _>("body"))).collect()
    }

    async fn list_for_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Vec<Invoice>, BillingError> {
        let rows = sqlx::query(
            r#"
            SELECT body FROM invoices
            WHERE subscription_id = $1
            ORDER BY period_start
            "#,
        )
        .bind(subscription_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("list invoices for subscription", e))?;
        rows.iter().map(|r| decode(r.get::<&str, _>("body"))).collect()
    }
}
