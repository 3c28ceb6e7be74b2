//! Proration arithmetic for mid-period plan changes.
//!
//! Both the credit for the unused remainder of the old plan and the charge
//! for the remainder on the new plan floor toward zero, so rounding always
//! favors the customer and a change never manufactures fractional cents.

/// Floor of `price * days_remaining / total_days`.
///
/// Intermediate math widens to i128 so a large annual price times a day
/// count cannot overflow. `total_days` of zero yields zero.
pub fn prorated_cents(price_cents: i64, days_remaining: i64, total_days: i64) -> i64 {
    if total_days <= 0 || days_remaining <= 0 || price_cents <= 0 {
        return 0;
    }
    let days_remaining = days_remaining.min(total_days);
    let numerator = price_cents as i128 * days_remaining as i128;
    (numerator / total_days as i128) as i64
}

/// The credit/charge pair for an immediate plan change.
///
/// Returns `(credit_cents, charge_cents)`: credit for the unused remainder
/// of the old plan, charge for the same remainder on the new plan.
pub fn proration_pair(
    old_price_cents: i64,
    new_price_cents: i64,
    days_remaining: i64,
    total_days: i64,
) -> (i64, i64) {
    (
        prorated_cents(old_price_cents, days_remaining, total_days),
        prorated_cents(new_price_cents, days_remaining, total_days),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn floors_toward_zero() {
        // 10 of 30 days left on a $49.00 plan: 49.00 * 10/30 = 16.333...
        assert_eq!(prorated_cents(4900, 10, 30), 1633);
    }

    #[test]
    fn full_remainder_is_full_price() {
        assert_eq!(prorated_cents(4900, 30, 30), 4900);
    }

    #[test]
    fn nothing_remaining_is_zero() {
        assert_eq!(prorated_cents(4900, 0, 30), 0);
        assert_eq!(prorated_cents(4900, -3, 30), 0);
    }

    #[test]
    fn degenerate_period_is_zero() {
        assert_eq!(prorated_cents(4900, 10, 0), 0);
    }

    #[test]
    fn remaining_days_clamp_to_period() {
        assert_eq!(prorated_cents(4900, 45, 30), 4900);
    }

    #[test]
    fn upgrade_pair() {
        // $49 -> $99 with 10 of 30 days left.
        let (credit, charge) = proration_pair(4900, 9900, 10, 30);
        assert_eq!(credit, 1633);
        assert_eq!(charge, 3300);
    }

    #[test]
    fn annual_prices_do_not_overflow() {
        let cents = prorated_cents(i64::MAX / 2, 200, 365);
        assert!(cents > 0);
    }

    proptest! {
        #[test]
        fn never_exceeds_full_price(
            price in 0i64..10_000_000,
            remaining in 0i64..400,
            total in 1i64..400,
        ) {
            let p = prorated_cents(price, remaining, total);
            prop_assert!(p >= 0);
            prop_assert!(p <= price);
        }

        #[test]
        fn monotone_in_days_remaining(
            price in 0i64..10_000_000,
            remaining in 0i64..399,
            total in 1i64..400,
        ) {
            prop_assert!(
                prorated_cents(price, remaining, total)
                    <= prorated_cents(price, remaining + 1, total)
            );
        }
    }
}
