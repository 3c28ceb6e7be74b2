//! Events recorded against a subscription's history.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{PlanVersionId, Timestamp};

/// What happened to a subscription, for the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubscriptionEvent {
    Created { plan: PlanVersionId, quantity: u32 },
    TrialEnded,
    PeriodClosed { period_start: Timestamp, period_end: Timestamp },
    PlanChanged { from: PlanVersionId, to: PlanVersionId, quantity: u32, immediate: bool },
    PlanChangeScheduled { to: PlanVersionId, quantity: u32 },
    CancelScheduled,
    Cancelled,
    Paused { resumes_at: Option<Timestamp> },
    Resumed,
    Expired,
}

impl SubscriptionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SubscriptionEvent::Created { .. } => "created",
            SubscriptionEvent::TrialEnded => "trial_ended",
            SubscriptionEvent::PeriodClosed { .. } => "period_closed",
            SubscriptionEvent::PlanChanged { .. } => "plan_changed",
            SubscriptionEvent::PlanChangeScheduled { .. } => "plan_change_scheduled",
            SubscriptionEvent::CancelScheduled => "cancel_scheduled",
            SubscriptionEvent::Cancelled => "cancelled",
            SubscriptionEvent::Paused { .. } => "paused",
            SubscriptionEvent::Resumed => "resumed",
            SubscriptionEvent::Expired => "expired",
        }
    }
}
