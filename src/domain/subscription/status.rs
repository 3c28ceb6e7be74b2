//! Subscription lifecycle states and the transition table.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::StateMachine;

/// Lifecycle state of a subscription.
///
/// `Cancelled` and `Expired` are terminal. `Expired` is reached only by
/// payment-retry exhaustion; `Cancelled` only by explicit request (or the
/// 90-day pause limit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trial,
    Active,
    Paused,
    Cancelled,
    Expired,
}

impl StateMachine for SubscriptionStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use SubscriptionStatus::*;
        matches!(
            (self, target),
            (Trial, Active)
                | (Trial, Cancelled)
                | (Active, Paused)
                | (Active, Cancelled)
                | (Active, Expired)
                | (Paused, Active)
                | (Paused, Cancelled)
                | (Paused, Expired)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SubscriptionStatus::*;
        match self {
            Trial => vec![Active, Cancelled],
            Active => vec![Paused, Cancelled, Expired],
            Paused => vec![Active, Cancelled, Expired],
            Cancelled => vec![],
            Expired => vec![],
        }
    }
}

impl SubscriptionStatus {
    /// States in which the subscription accrues recurring and usage charges.
    pub fn is_billable(&self) -> bool {
        matches!(self, SubscriptionStatus::Trial | SubscriptionStatus::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trial => "trial",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Paused => "paused",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Expired => "expired",
        }
    }
}
