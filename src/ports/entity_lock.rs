//! Per-entity locks.
//!
//! Handlers serialize on the entity they mutate: one lock per
//! subscription for lifecycle and billing, one per invoice for payment
//! collection, one per account for credit application. The lease releases
//! on drop or explicitly.

use async_trait::async_trait;

use crate::domain::foundation::{AccountId, BillingError, InvoiceId, SubscriptionId};

/// What a lock protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockScope {
    Subscription(SubscriptionId),
    Invoice(InvoiceId),
    Account(AccountId),
}

impl std::fmt::Display for LockScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockScope::Subscription(id) => write!(f, "subscription:{}", id),
            LockScope::Invoice(id) => write!(f, "invoice:{}", id),
            LockScope::Account(id) => write!(f, "account:{}", id),
        }
    }
}

/// A held lock. Dropping the lease releases it; `release` exists for
/// callers that want to release before the end of scope and observe
/// errors doing so.
#[async_trait]
pub trait LockLease: Send {
    async fn release(self: Box<Self>) -> Result<(), BillingError>;
}

#[async_trait]
pub trait EntityLock: Send + Sync {
    /// Acquires the lock for `scope`, waiting if another holder has it.
    async fn acquire(&self, scope: LockScope) -> Result<Box<dyn LockLease>, BillingError>;
}
