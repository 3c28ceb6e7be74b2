//! Subscription lifecycle: aggregate, status machine, events, and history.

mod aggregate;
mod events;
mod history;
mod status;

pub use aggregate::{ClosedPeriod, PendingChange, Subscription};
pub use events::SubscriptionEvent;
pub use history::{state_at, HistoryRecord};
pub use status::SubscriptionStatus;
