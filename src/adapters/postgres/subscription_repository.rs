//! PostgreSQL implementation of SubscriptionRepository.
//!
//! The aggregate is stored as serialized JSON alongside the columns the
//! sweeps filter on, so queries stay indexable without a column per
//! field.

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::domain::foundation::{AccountId, BillingError, ErrorCode, SubscriptionId, Timestamp};
use crate::domain::subscription::Subscription;
use crate::ports::SubscriptionRepository;

#[derive(Clone)]
pub struct PostgresSubscriptionRepository {
    pool: PgPool,
}

impl PostgresSubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_err(context: &str, err: impl std::fmt::Display) -> BillingError {
    BillingError::new(ErrorCode::DatabaseError, format!("{}: {}", context, err))
}

fn decode(body: &str) -> Result<Subscription, BillingError> {
    serde_json::from_str(body).map_err(|e| db_err("corrupt subscription row", e))
}

fn encode(subscription: &Subscription) -> Result<String, BillingError> {
    serde_json::to_string(subscription).map_err(|e| db_err("serialize subscription", e))
}

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn find(&self, id: SubscriptionId) -> Result<Option<Subscription>, BillingError> {
        let row = sqlx::query("SELECT body FROM subscriptions WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_err("fetch subscription", e))?;
        row.map(|r| decode(r.get::<&str, _>("body"))).transpose()
    }

    async fn save(&self, subscription: &Subscription) -> Result<(), BillingError> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (id, account_id, status, period_end, body, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                period_end = EXCLUDED.period_end,
                body = EXCLUDED.body,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(subscription.id().as_uuid())
        .bind(subscription.account_id().as_uuid())
        .bind(subscription.status().as_str())
        .bind(subscription.period_end().as_datetime())
        .bind(encode(subscription)?)
        .bind(subscription.updated_at().as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("save subscription", e))?;
        Ok(())
    }

    async fn list_by_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Subscription>, BillingError> {
        let rows = sqlx::query(
            "SELECT body FROM subscriptions WHERE account_id = $1 ORDER BY updated_at",
        )
        .bind(account_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("list subscriptions by account", e))?;
        rows.iter().map(|r| decode(r.get::<&str, _>("body"))).collect()
    }

    async fn list_due_for_close(
        &self,
        now: Timestamp,
    ) -> Result<Vec<Subscription>, BillingError> {
        let rows = sqlx::query(
            r#"
            SELECT body FROM subscriptions
            WHERE status IN ('trial', 'active') AND period_end <= $1
            ORDER BY period_end
            "#,
        )
        .bind(now.as_datetime())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("list subscriptions due for close", e))?;
        rows.iter().map(|r| decode(r.get::<&str, _>("body"))).collect()
    }

    async fn list_paused(&self) -> Result<Vec<Subscription>, BillingError> {
        let rows = sqlx::query("SELECT body FROM subscriptions WHERE status = 'paused'")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_err("list paused subscriptions", e))?;
        rows.iter().map(|r| decode(r.get::<&str, _>("body"))).collect()
    }
}
