//! Payments: attempts, the retry schedule, and dunning levels.

mod attempt;
mod overdue;
mod retry;

pub use attempt::{AttemptStatus, PaymentAttempt};
pub use overdue::{DunningLevel, BLOCKED_AFTER_DAYS, WARNING_AFTER_DAYS};
pub use retry::{is_exhausted, next_retry_at, MAX_ATTEMPTS, RETRY_OFFSETS_DAYS};
