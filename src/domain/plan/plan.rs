//! Plan catalog: versioned plans with a fixed recurring price and optional
//! metered components.
//!
//! Plans are immutable once created. A price or tier change produces a new
//! `PlanVersion` in the same family; existing subscriptions keep billing on
//! the version they reference until an explicit plan change moves them.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    Money, PlanFamilyId, PlanVersionId, Timestamp, ValidationError,
};

use super::tiers::TierSchedule;

/// How often the recurring charge bills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingInterval {
    Monthly,
    Quarterly,
    Annual,
}

impl BillingInterval {
    /// Number of calendar months covered by one billing period.
    pub fn months(&self) -> u32 {
        match self {
            BillingInterval::Monthly => 1,
            BillingInterval::Quarterly => 3,
            BillingInterval::Annual => 12,
        }
    }

    /// Advances a period boundary by one interval, clamping to the last day
    /// of shorter months (Jan 31 + 1 month = Feb 28).
    pub fn advance(&self, from: Timestamp) -> Timestamp {
        from.add_months(self.months())
    }
}

/// A usage-priced dimension of a plan, e.g. `api_calls`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeteredComponent {
    pub metric: String,
    pub schedule: TierSchedule,
}

impl MeteredComponent {
    pub fn new(metric: impl Into<String>, schedule: TierSchedule) -> Result<Self, ValidationError> {
        let metric = metric.into();
        if metric.trim().is_empty() {
            return Err(ValidationError::empty_field("metric"));
        }
        Ok(Self { metric, schedule })
    }
}

/// One immutable version of a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanVersion {
    id: PlanVersionId,
    family: PlanFamilyId,
    version: u32,
    name: String,
    interval: BillingInterval,
    recurring_price: Money,
    trial_days: u32,
    metered: Vec<MeteredComponent>,
    created_at: Timestamp,
}

impl PlanVersion {
    /// Creates the first version of a new plan family.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty, the price is negative, or two
    /// metered components share a metric name.
    pub fn create(
        name: impl Into<String>,
        interval: BillingInterval,
        recurring_price: Money,
        trial_days: u32,
        metered: Vec<MeteredComponent>,
        now: Timestamp,
    ) -> Result<Self, ValidationError> {
        Self::build(
            PlanFamilyId::new(),
            1,
            name,
            interval,
            recurring_price,
            trial_days,
            metered,
            now,
        )
    }

    /// Creates the next version in this plan's family. The current version
    /// stays in the catalog untouched; subscribers move only via plan change.
    pub fn supersede(
        &self,
        recurring_price: Money,
        metered: Vec<MeteredComponent>,
        now: Timestamp,
    ) -> Result<Self, ValidationError> {
        Self::build(
            self.family,
            self.version + 1,
            self.name.clone(),
            self.interval,
            recurring_price,
            self.trial_days,
            metered,
            now,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        family: PlanFamilyId,
        version: u32,
        name: impl Into<String>,
        interval: BillingInterval,
        recurring_price: Money,
        trial_days: u32,
        metered: Vec<MeteredComponent>,
        now: Timestamp,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::empty_field("name"));
        }
        if recurring_price.is_negative() {
            return Err(ValidationError::out_of_range(
                "recurring_price",
                0,
                i64::MAX,
                recurring_price.cents(),
            ));
        }
        for (i, component) in metered.iter().enumerate() {
            if metered[..i].iter().any(|c| c.metric == component.metric) {
                return Err(ValidationError::invalid_format(
                    "metered",
                    format!("duplicate metric '{}'", component.metric),
                ));
            }
        }
        Ok(Self {
            id: PlanVersionId::new(),
            family,
            version,
            name,
            interval,
            recurring_price,
            trial_days,
            metered,
            created_at: now,
        })
    }

    pub fn id(&self) -> PlanVersionId {
        self.id
    }

    pub fn family(&self) -> PlanFamilyId {
        self.family
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> BillingInterval {
        self.interval
    }

    pub fn recurring_price(&self) -> Money {
        self.recurring_price
    }

    pub fn trial_days(&self) -> u32 {
        self.trial_days
    }

    pub fn has_trial(&self) -> bool {
        self.trial_days > 0
    }

    pub fn metered(&self) -> &[MeteredComponent] {
        &self.metered
    }

    /// Looks up the tier schedule for a metric, if this plan meters it.
    pub fn schedule_for(&self, metric: &str) -> Option<&TierSchedule> {
        self.metered
            .iter()
            .find(|c| c.metric == metric)
            .map(|c| &c.schedule)
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }
}
