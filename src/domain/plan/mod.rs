//! Plan catalog: immutable versioned plans and usage tier schedules.

#[allow(clippy::module_inception)]
mod plan;
mod tiers;

pub use plan::{BillingInterval, MeteredComponent, PlanVersion};
pub use tiers::{TierOverflow, TierSchedule, UsageTier};
