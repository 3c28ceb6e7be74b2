//! Advisory-lock based EntityLock.
//!
//! Each scope hashes to a 64-bit advisory key held on a dedicated
//! connection. The connection is detached from the pool and closed when
//! the lease ends, so a lease dropped without an explicit release still
//! frees the lock at the server.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::postgres::PgConnection;
use sqlx::{Connection, PgPool};

use crate::domain::foundation::{BillingError, ErrorCode};
use crate::ports::{EntityLock, LockLease, LockScope};

#[derive(Clone)]
pub struct PgAdvisoryLock {
    pool: PgPool,
}

impl PgAdvisoryLock {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_err(context: &str, err: impl std::fmt::Display) -> BillingError {
    BillingError::new(ErrorCode::DatabaseError, format!("{}: {}", context, err))
}

/// Stable 64-bit key for a scope. The scope kind is part of the hashed
/// text, so a subscription and an invoice sharing a UUID cannot collide.
fn advisory_key(scope: &LockScope) -> i64 {
    let digest = Sha256::digest(scope.to_string().as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(bytes)
}

struct AdvisoryLease {
    conn: Option<PgConnection>,
    key: i64,
}

#[async_trait]
impl LockLease for AdvisoryLease {
    async fn release(mut self: Box<Self>) -> Result<(), BillingError> {
        if let Some(mut conn) = self.conn.take() {
            sqlx::query("SELECT pg_advisory_unlock($1)")
                .bind(self.key)
                .execute(&mut conn)
                .await
                .map_err(|e| db_err("release advisory lock", e))?;
            conn.close().await.map_err(|e| db_err("close lock connection", e))?;
        }
        Ok(())
    }
}

// Dropping the lease without release() drops the connection, which closes
// the session and frees the lock server-side.

#[async_trait]
impl EntityLock for PgAdvisoryLock {
    async fn acquire(&self, scope: LockScope) -> Result<Box<dyn LockLease>, BillingError> {
        let key = advisory_key(&scope);
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| db_err("acquire lock connection", e))?
            .detach();
        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(key)
            .execute(&mut conn)
            .await
            .map_err(|e| db_err("acquire advisory lock", e))?;
        Ok(Box::new(AdvisoryLease {
            conn: Some(conn),
            key,
        }))
    }
}
