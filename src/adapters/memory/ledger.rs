//! In-memory dunning ledger and work queue.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::foundation::{AccountId, BillingError, Timestamp};
use crate::domain::payment::DunningLevel;
use crate::ports::{DunningLedger, ScheduledTask, WorkQueue};

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
pub struct InMemoryDunningLedger {
    levels: Mutex<HashMap<AccountId, (DunningLevel, Timestamp)>>,
}

impl InMemoryDunningLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DunningLedger for InMemoryDunningLedger {
    async fn level_for(&self, account_id: AccountId) -> Result<DunningLevel, BillingError> {
        Ok(guard(&self.levels)
            .get(&account_id)
            .map(|(level, _)| *level)
            .unwrap_or(DunningLevel::Current))
    }

    async fn set_level(
        &self,
        account_id: AccountId,
        level: DunningLevel,
        at: Timestamp,
    ) -> Result<(), BillingError> {
        guard(&self.levels).insert(account_id, (level, at));
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryWorkQueue {
    tasks: Mutex<Vec<ScheduledTask>>,
}

impl InMemoryWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks still queued, for test assertions.
    pub fn pending(&self) -> Vec<ScheduledTask> {
        guard(&self.tasks).clone()
    }
}

#[async_trait]
impl WorkQueue for InMemoryWorkQueue {
    async fn schedule(&self, task: ScheduledTask) -> Result<(), BillingError> {
        guard(&self.tasks).push(task);
        Ok(())
    }

    async fn take_due(&self, now: Timestamp) -> Result<Vec<ScheduledTask>, BillingError> {
        let mut tasks = guard(&self.tasks);
        let (due, rest): (Vec<_>, Vec<_>) = tasks
            .drain(..)
            .partition(|t| !t.run_at.is_after(&now));
        *tasks = rest;
        let mut due = due;
        due.sort_by_key(|t| t.run_at);
        Ok(due)
    }
}
