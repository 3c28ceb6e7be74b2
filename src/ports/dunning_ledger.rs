//! Account dunning standing.
//!
//! The ledger records each account's current level so reads do not rescan
//! invoices; the dunning sweep and settlement keep it in step with the
//! oldest open invoice.

use async_trait::async_trait;

use crate::domain::foundation::{AccountId, BillingError, Timestamp};
use crate::domain::payment::DunningLevel;

#[async_trait]
pub trait DunningLedger: Send + Sync {
    /// The account's current level. Accounts never seen are `Current`.
    async fn level_for(&self, account_id: AccountId) -> Result<DunningLevel, BillingError>;

    async fn set_level(
        &self,
        account_id: AccountId,
        level: DunningLevel,
        at: Timestamp,
    ) -> Result<(), BillingError>;
}
