//! Account billing profiles: jurisdiction, tax standing, payment method.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{AccountId, BillingError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingProfile {
    pub account_id: AccountId,
    pub jurisdiction: String,
    pub tax_exempt: bool,
    pub vat_id: Option<String>,
    /// Gateway token for the stored payment method, absent when the
    /// customer never added one.
    pub payment_method: Option<String>,
}

#[async_trait]
pub trait BillingProfiles: Send + Sync {
    async fn find(&self, account_id: AccountId) -> Result<Option<BillingProfile>, BillingError>;

    async fn save(&self, profile: &BillingProfile) -> Result<(), BillingError>;
}
