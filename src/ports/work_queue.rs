//! Scheduled work, currently payment retries.
//!
//! Retry timing lives here rather than in a sleeping task so a restart
//! never loses a scheduled attempt.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::foundation::{BillingError, InvoiceId, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskKind {
    PaymentRetry {
        invoice_id: InvoiceId,
        attempt_number: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: Uuid,
    pub run_at: Timestamp,
    pub kind: TaskKind,
}

impl ScheduledTask {
    pub fn new(run_at: Timestamp, kind: TaskKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_at,
            kind,
        }
    }
}

#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn schedule(&self, task: ScheduledTask) -> Result<(), BillingError>;

    /// Removes and returns every task whose `run_at` is at or before `now`,
    /// oldest first. A task a sweep fails to process must be rescheduled
    /// by the sweep itself.
    async fn take_due(&self, now: Timestamp) -> Result<Vec<ScheduledTask>, BillingError>;
}
