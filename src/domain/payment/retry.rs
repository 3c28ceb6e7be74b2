//! The payment retry schedule.
//!
//! A failed invoice is retried at fixed offsets past its due date: days
//! 3, 5, 7, and 10. After the initial attempt plus four retries the
//! schedule is exhausted and collection gives up.

use crate::domain::foundation::Timestamp;

/// Days past due at which each retry fires.
pub const RETRY_OFFSETS_DAYS: [i64; 4] = [3, 5, 7, 10];

/// Initial attempt plus the four scheduled retries.
pub const MAX_ATTEMPTS: u32 = 1 + RETRY_OFFSETS_DAYS.len() as u32;

/// When the next attempt should run, given how many attempts have already
/// failed. `None` once the schedule is exhausted.
///
/// `failed_attempts` counts the initial attempt: after the first failure
/// the next attempt is due day 3, after the second it is day 5, and so on.
pub fn next_retry_at(due_at: Timestamp, failed_attempts: u32) -> Option<Timestamp> {
    if failed_attempts == 0 {
        return Some(due_at);
    }
    RETRY_OFFSETS_DAYS
        .get(failed_attempts as usize - 1)
        .map(|offset| due_at.add_days(*offset))
}

/// True once every scheduled attempt has failed.
pub fn is_exhausted(failed_attempts: u32) -> bool {
    failed_attempts >= MAX_ATTEMPTS
}
