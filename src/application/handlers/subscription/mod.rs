//! Subscription lifecycle handlers.

mod cancel_subscription;
mod change_plan;
mod create_subscription;
mod pause_subscription;
mod resume_subscription;

pub use cancel_subscription::CancelSubscription;
pub use change_plan::{ChangePlan, PlanChangeOutcome};
pub use create_subscription::CreateSubscription;
pub use pause_subscription::PauseSubscription;
pub use resume_subscription::ResumeSubscription;
