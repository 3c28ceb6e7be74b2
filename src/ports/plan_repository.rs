//! Plan catalog persistence.

use async_trait::async_trait;

use crate::domain::foundation::{BillingError, PlanFamilyId, PlanVersionId};
use crate::domain::plan::PlanVersion;

#[async_trait]
pub trait PlanRepository: Send + Sync {
    async fn find(&self, id: PlanVersionId) -> Result<Option<PlanVersion>, BillingError>;

    /// Inserts a new version. Versions are immutable, so there is no update.
    async fn save(&self, plan: &PlanVersion) -> Result<(), BillingError>;

    /// All versions in a family, oldest first.
    async fn list_family(&self, family: PlanFamilyId) -> Result<Vec<PlanVersion>, BillingError>;
}
