//! PostgreSQL implementation of the append-only history store.

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::domain::foundation::{BillingError, ErrorCode, SubscriptionId};
use crate::domain::subscription::HistoryRecord;
use crate::ports::HistoryStore;

#[derive(Clone)]
pub struct PostgresHistoryStore {
    pool: PgPool,
}

impl PostgresHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_err(context: &str, err: impl std::fmt::Display) -> BillingError {
    BillingError::new(ErrorCode::DatabaseError, format!("{}: {}", context, err))
}

#[async_trait]
impl HistoryStore for PostgresHistoryStore {
    async fn append(&self, record: HistoryRecord) -> Result<(), BillingError> {
        let body = serde_json::to_string(&record)
            .map_err(|e| db_err("serialize history record", e))?;
        sqlx::query(
            r#"
            INSERT INTO subscription_history (subscription_id, recorded_at, body)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(record.subscription_id.as_uuid())
        .bind(record.recorded_at.as_datetime())
        .bind(body)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("append history record", e))?;
        Ok(())
    }

    async fn list_for(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Vec<HistoryRecord>, BillingError> {
        let rows = sqlx::query(
            r#"
            SELECT body FROM subscription_history
            WHERE subscription_id = $1
            ORDER BY id
            "#,
        )
        .bind(subscription_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("list history", e))?;
        rows.iter()
            .map(|r| {
                serde_json::from_str(r.get::<&str, _>("body"))
                    .map_err(|e| db_err("corrupt history row", e))
            })
            .collect()
    }
}
