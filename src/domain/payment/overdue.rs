//! Dunning levels.
//!
//! An account's standing derives from its oldest open invoice: seven days
//! past due moves it to `Warning`, fourteen to `Blocked`. Settling the
//! delinquent invoice clears the standing in the same transaction.

use serde::{Deserialize, Serialize};

/// Days past due before the account gets a warning.
pub const WARNING_AFTER_DAYS: i64 = 7;

/// Days past due before new activity on the account is blocked.
pub const BLOCKED_AFTER_DAYS: i64 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DunningLevel {
    Current,
    Warning,
    Blocked,
}

impl DunningLevel {
    /// The level implied by the oldest open invoice's days past due.
    /// `None` (no open overdue invoice) and negative values are `Current`.
    pub fn for_days_past_due(days: Option<i64>) -> Self {
        match days {
            Some(d) if d >= BLOCKED_AFTER_DAYS => DunningLevel::Blocked,
            Some(d) if d >= WARNING_AFTER_DAYS => DunningLevel::Warning,
            _ => DunningLevel::Current,
        }
    }

    pub fn is_blocked(&self) -> bool {
        *self == DunningLevel::Blocked
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DunningLevel::Current => "current",
            DunningLevel::Warning => "warning",
            DunningLevel::Blocked => "blocked",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_are_inclusive() {
        assert_eq!(DunningLevel::for_days_past_due(None), DunningLevel::Current);
        assert_eq!(DunningLevel::for_days_past_due(Some(-2)), DunningLevel::Current);
        assert_eq!(DunningLevel::for_days_past_due(Some(6)), DunningLevel::Current);
        assert_eq!(DunningLevel::for_days_past_due(Some(7)), DunningLevel::Warning);
        assert_eq!(DunningLevel::for_days_past_due(Some(13)), DunningLevel::Warning);
        assert_eq!(DunningLevel::for_days_past_due(Some(14)), DunningLevel::Blocked);
        assert_eq!(DunningLevel::for_days_past_due(Some(90)), DunningLevel::Blocked);
    }

    #[test]
    fn levels_are_ordered() {
        assert!(DunningLevel::Current < DunningLevel::Warning);
        assert!(DunningLevel::Warning < DunningLevel::Blocked);
    }
}
