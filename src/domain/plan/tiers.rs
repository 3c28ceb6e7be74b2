//! Usage tier schedules for metered pricing.
//!
//! A schedule is an ordered list of quantity bands, each with its own unit
//! price. Unit prices are expressed in millicents (thousandths of a cent)
//! so that sub-cent rates like 0.5¢/unit are exact; charges floor to whole
//! cents only after summation.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::ValidationError;

/// One quantity band of a tier schedule.
///
/// `up_to` is the inclusive upper bound on cumulative quantity covered by
/// this tier; `None` marks an open-ended top tier and may only appear last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTier {
    /// Inclusive cumulative upper bound, or None for an unbounded top tier.
    pub up_to: Option<u64>,

    /// Price per unit in millicents.
    pub unit_price_millicents: i64,
}

/// What happens to quantity above the last bounded tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierOverflow {
    /// Bill overflow at the last tier's unit price.
    OpenEnded,

    /// Reject usage beyond the last tier's upper bound.
    Reject,
}

/// Validated, ordered tier schedule for one metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierSchedule {
    tiers: Vec<UsageTier>,
    overflow: TierOverflow,
}

impl TierSchedule {
    /// Builds a schedule, validating tier ordering at plan-creation time.
    ///
    /// # Errors
    ///
    /// Returns an error if the schedule is empty, bounds are not strictly
    /// increasing, an unbounded tier appears before the end, or a price is
    /// negative.
    pub fn new(tiers: Vec<UsageTier>, overflow: TierOverflow) -> Result<Self, ValidationError> {
        if tiers.is_empty() {
            return Err(ValidationError::empty_field("tiers"));
        }

        let mut previous_bound: u64 = 0;
        for (index, tier) in tiers.iter().enumerate() {
            if tier.unit_price_millicents < 0 {
                return Err(ValidationError::invalid_format(
                    "tiers",
                    format!("tier {} has a negative unit price", index),
                ));
            }
            match tier.up_to {
                Some(bound) => {
                    if index > 0 && bound <= previous_bound {
                        return Err(ValidationError::invalid_format(
                            "tiers",
                            format!(
                                "tier {} bound {} does not exceed previous bound {}",
                                index, bound, previous_bound
                            ),
                        ));
                    }
                    if index == 0 && bound == 0 {
                        return Err(ValidationError::invalid_format(
                            "tiers",
                            "first tier bound must be greater than zero",
                        ));
                    }
                    previous_bound = bound;
                }
                None => {
                    if index != tiers.len() - 1 {
                        return Err(ValidationError::invalid_format(
                            "tiers",
                            "an unbounded tier may only appear last",
                        ));
                    }
                }
            }
        }

        Ok(Self { tiers, overflow })
    }

    /// The tiers in order.
    pub fn tiers(&self) -> &[UsageTier] {
        &self.tiers
    }

    /// The configured overflow policy.
    pub fn overflow(&self) -> TierOverflow {
        self.overflow
    }

    /// True when the top tier has no upper bound.
    pub fn is_open_ended(&self) -> bool {
        self.tiers
            .last()
            .map(|t| t.up_to.is_none())
            .unwrap_or(false)
            || self.overflow == TierOverflow::OpenEnded
    }

    /// The highest bounded quantity, if every tier is bounded.
    pub fn capacity(&self) -> Option<u64> {
        self.tiers.last().and_then(|t| t.up_to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tier(up_to: Option<u64>, millicents: i64) -> UsageTier {
        UsageTier {
            up_to,
            unit_price_millicents: millicents,
        }
    }

    #[test]
    fn accepts_increasing_bounds_with_open_top() {
        let schedule = TierSchedule::new(
            vec![tier(Some(1000), 0), tier(Some(10_000), 1000), tier(None, 500)],
            TierOverflow::OpenEnded,
        );
        assert!(schedule.is_ok());
    }

    #[test]
    fn rejects_empty_schedule() {
        assert!(TierSchedule::new(vec![], TierOverflow::Reject).is_err());
    }

    #[test]
    fn rejects_non_increasing_bounds() {
        let result = TierSchedule::new(
            vec![tier(Some(1000), 0), tier(Some(1000), 100)],
            TierOverflow::Reject,
        );
        assert!(result.is_err());
    }

    #[test]
    fn rejects_unbounded_tier_before_end() {
        let result = TierSchedule::new(
            vec![tier(None, 100), tier(Some(1000), 0)],
            TierOverflow::Reject,
        );
        assert!(result.is_err());
    }

    #[test]
    fn rejects_negative_price() {
        let result = TierSchedule::new(vec![tier(Some(100), -1)], TierOverflow::Reject);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_zero_first_bound() {
        let result = TierSchedule::new(vec![tier(Some(0), 10)], TierOverflow::Reject);
        assert!(result.is_err());
    }

    #[test]
    fn capacity_is_last_bound_when_all_bounded() {
        let schedule = TierSchedule::new(
            vec![tier(Some(1000), 0), tier(Some(5000), 100)],
            TierOverflow::Reject,
        )
        .unwrap();
        assert_eq!(schedule.capacity(), Some(5000));
        assert!(!schedule.is_open_ended());
    }
}
