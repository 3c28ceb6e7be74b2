//! Append-only subscription history.
//!
//! Every lifecycle mutation appends a record carrying the event and the
//! post-mutation snapshot, which makes "what was this subscription's state
//! at time X" a lookup rather than a replay.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{SubscriptionId, Timestamp};

use super::aggregate::Subscription;
use super::events::SubscriptionEvent;

/// One entry in a subscription's audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub subscription_id: SubscriptionId,
    pub recorded_at: Timestamp,
    pub event: SubscriptionEvent,
    pub snapshot: Subscription,
}

impl HistoryRecord {
    pub fn new(event: SubscriptionEvent, snapshot: &Subscription, recorded_at: Timestamp) -> Self {
        Self {
            subscription_id: snapshot.id(),
            recorded_at,
            event,
            snapshot: snapshot.clone(),
        }
    }
}

/// Returns the snapshot in effect at `at`: the latest record not after
/// `at`. `None` when the subscription did not exist yet.
///
/// `records` must be in append order, which repositories guarantee.
pub fn state_at(records: &[HistoryRecord], at: Timestamp) -> Option<&Subscription> {
    records
        .iter()
        .rev()
        .find(|r| !r.recorded_at.is_after(&at))
        .map(|r| &r.snapshot)
}
