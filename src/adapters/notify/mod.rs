//! Notification delivery adapters.

mod log_notifier;
mod retrying;

pub use log_notifier::LogNotifier;
pub use retrying::RetryingNotifier;
