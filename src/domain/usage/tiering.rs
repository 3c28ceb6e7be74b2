//! Tiered usage charges.
//!
//! Quantity fills tiers in order; each band bills at its own unit price.
//! Arithmetic runs in millicents and only the final sum floors to cents,
//! so sub-cent unit prices never lose precision band by band.

use crate::domain::foundation::{BillingError, ErrorCode};
use crate::domain::plan::{TierOverflow, TierSchedule};

/// Charge in cents for `quantity` units under `schedule`.
///
/// # Errors
///
/// Returns a validation error when quantity exceeds a fully-bounded
/// schedule with a `Reject` overflow policy.
pub fn tiered_charge_cents(schedule: &TierSchedule, quantity: u64) -> Result<i64, BillingError> {
    let mut remaining = quantity;
    let mut previous_bound: u64 = 0;
    let mut total_millicents: i128 = 0;
    let mut last_price: i64 = 0;

    for tier in schedule.tiers() {
        if remaining == 0 {
            break;
        }
        last_price = tier.unit_price_millicents;
        let band = match tier.up_to {
            Some(bound) => {
                let width = bound - previous_bound;
                previous_bound = bound;
                remaining.min(width)
            }
            None => remaining,
        };
        total_millicents += band as i128 * tier.unit_price_millicents as i128;
        remaining -= band;
    }

    if remaining > 0 {
        match schedule.overflow() {
            TierOverflow::OpenEnded => {
                total_millicents += remaining as i128 * last_price as i128;
            }
            TierOverflow::Reject => {
                return Err(BillingError::new(
                    ErrorCode::OutOfRange,
                    format!(
                        "quantity {} exceeds the schedule capacity of {}",
                        quantity,
                        schedule.capacity().unwrap_or(0)
                    ),
                ));
            }
        }
    }

    Ok((total_millicents / 1000) as i64)
}

/// Charge in cents for late usage arriving after its period closed: the
/// difference the extra quantity makes on top of what was already billed.
/// Marginal pricing keeps the combined charge identical to what a single
/// timely ingestion would have produced.
pub fn marginal_charge_cents(
    schedule: &TierSchedule,
    billed_quantity: u64,
    late_quantity: u64,
) -> Result<i64, BillingError> {
    let with = tiered_charge_cents(schedule, billed_quantity + late_quantity)?;
    let without = tiered_charge_cents(schedule, billed_quantity)?;
    Ok(with - without)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::plan::UsageTier;
    use proptest::prelude::*;

    fn tier(up_to: Option<u64>, millicents: i64) -> UsageTier {
        UsageTier {
            up_to,
            unit_price_millicents: millicents,
        }
    }

    fn standard_schedule() -> TierSchedule {
        // First 1,000 free; next 9,000 at 1 cent; beyond at 0.5 cents.
        TierSchedule::new(
            vec![tier(Some(1000), 0), tier(Some(10_000), 1000), tier(None, 500)],
            TierOverflow::OpenEnded,
        )
        .unwrap()
    }

    #[test]
    fn charges_across_bands() {
        // 12,000 units: 1,000 free + 9,000 * 1c + 2,000 * 0.5c = 100.00.
        assert_eq!(tiered_charge_cents(&standard_schedule(), 12_000).unwrap(), 10_000);
    }

    #[test]
    fn zero_quantity_is_free() {
        assert_eq!(tiered_charge_cents(&standard_schedule(), 0).unwrap(), 0);
    }

    #[test]
    fn quantity_inside_free_tier_is_free() {
        assert_eq!(tiered_charge_cents(&standard_schedule(), 1000).unwrap(), 0);
    }

    #[test]
    fn sub_cent_totals_floor_to_cents() {
        // 3 units at 0.5c = 1.5c, floors to 1.
        let schedule =
            TierSchedule::new(vec![tier(None, 500)], TierOverflow::OpenEnded).unwrap();
        assert_eq!(tiered_charge_cents(&schedule, 3).unwrap(), 1);
    }

    #[test]
    fn reject_policy_errors_past_capacity() {
        let schedule =
            TierSchedule::new(vec![tier(Some(5000), 1000)], TierOverflow::Reject).unwrap();
        assert_eq!(tiered_charge_cents(&schedule, 5000).unwrap(), 5000);
        assert!(tiered_charge_cents(&schedule, 5001).is_err());
    }

    #[test]
    fn open_ended_policy_extends_last_bounded_price() {
        let schedule =
            TierSchedule::new(vec![tier(Some(5000), 1000)], TierOverflow::OpenEnded).unwrap();
        assert_eq!(tiered_charge_cents(&schedule, 6000).unwrap(), 6000);
    }

    #[test]
    fn marginal_charge_matches_single_ingestion() {
        let schedule = standard_schedule();
        // 9,500 already billed; 3,000 arrive late. Combined must equal a
        // single 12,500-unit ingestion.
        let billed = tiered_charge_cents(&schedule, 9500).unwrap();
        let marginal = marginal_charge_cents(&schedule, 9500, 3000).unwrap();
        let combined = tiered_charge_cents(&schedule, 12_500).unwrap();
        assert_eq!(billed + marginal, combined);
    }

    proptest! {
        #[test]
        fn marginal_is_path_independent(
            billed in 0u64..20_000,
            late in 0u64..20_000,
        ) {
            let schedule = standard_schedule();
            let split = tiered_charge_cents(&schedule, billed).unwrap()
                + marginal_charge_cents(&schedule, billed, late).unwrap();
            let single = tiered_charge_cents(&schedule, billed + late).unwrap();
            prop_assert_eq!(split, single);
        }

        #[test]
        fn charge_is_monotone(quantity in 0u64..30_000) {
            let schedule = standard_schedule();
            let a = tiered_charge_cents(&schedule, quantity).unwrap();
            let b = tiered_charge_cents(&schedule, quantity + 1).unwrap();
            prop_assert!(b >= a);
        }
    }
}
