//! In-process entity locks.
//!
//! One tokio mutex per scope, created on first use. Suits a single-node
//! deployment and tests; multi-node deployments use the advisory-lock
//! adapter instead.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;

use crate::domain::foundation::BillingError;
use crate::ports::{EntityLock, LockLease, LockScope};

#[derive(Default)]
pub struct InMemoryEntityLock {
    locks: Mutex<HashMap<LockScope, Arc<tokio::sync::Mutex<()>>>>,
}

impl InMemoryEntityLock {
    pub fn new() -> Self {
        Self::default()
    }
}

struct InMemoryLease {
    _guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl LockLease for InMemoryLease {
    async fn release(self: Box<Self>) -> Result<(), BillingError> {
        Ok(())
    }
}

#[async_trait]
impl EntityLock for InMemoryEntityLock {
    async fn acquire(&self, scope: LockScope) -> Result<Box<dyn LockLease>, BillingError> {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks
                .entry(scope)
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        let guard = mutex.lock_owned().await;
        Ok(Box::new(InMemoryLease { _guard: guard }))
    }
}
