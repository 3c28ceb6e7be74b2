//! Account credit persistence.

use async_trait::async_trait;

use crate::domain::foundation::{AccountId, BillingError, CreditId};
use crate::domain::invoice::Credit;

#[async_trait]
pub trait CreditRepository: Send + Sync {
    async fn find(&self, id: CreditId) -> Result<Option<Credit>, BillingError>;

    async fn save(&self, credit: &Credit) -> Result<(), BillingError>;

    /// Writes a batch of drawn-down credits together with the settlement
    /// that consumed them.
    async fn save_all(&self, credits: &[Credit]) -> Result<(), BillingError>;

    /// Unexhausted credits for an account, oldest first.
    async fn list_available(&self, account_id: AccountId) -> Result<Vec<Credit>, BillingError>;
}
