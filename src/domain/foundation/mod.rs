//! Shared building blocks for the billing domain: typed ids, timestamps,
//! money, idempotency keys, the state machine trait, and the error taxonomy.

mod errors;
mod idempotency;
mod ids;
mod money;
mod state_machine;
mod timestamp;

pub use errors::{BillingError, ErrorCode, ValidationError};
pub use idempotency::{hex_encode, IdempotencyKey};
pub use ids::{
    AccountId, CreditId, InvoiceId, PaymentAttemptId, PlanFamilyId, PlanVersionId, SubscriptionId,
    UsageRecordId,
};
pub use money::{Currency, Money};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
