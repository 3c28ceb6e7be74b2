//! Port traits: the seams between the application core and the outside
//! world. Adapters implement these; handlers depend only on the traits.

mod billing_profiles;
mod clock;
mod credit_repository;
mod dunning_ledger;
mod entity_lock;
mod history_store;
mod invoice_repository;
mod notifier;
mod payment_attempt_repository;
mod payment_gateway;
mod plan_repository;
mod subscription_repository;
mod tax_service;
mod usage_store;
mod work_queue;

pub use billing_profiles::{BillingProfile, BillingProfiles};
pub use clock::{Clock, SystemClock};
pub use credit_repository::CreditRepository;
pub use dunning_ledger::DunningLedger;
pub use entity_lock::{EntityLock, LockLease, LockScope};
pub use history_store::HistoryStore;
pub use invoice_repository::InvoiceRepository;
pub use notifier::{Notification, Notifier, NotifyError};
pub use payment_attempt_repository::PaymentAttemptRepository;
pub use payment_gateway::{
    ChargeOutcome, ChargeRequest, GatewayError, GatewayNotification, NotificationKind,
    PaymentGateway,
};
pub use plan_repository::PlanRepository;
pub use subscription_repository::SubscriptionRepository;
pub use tax_service::{TaxAssessment, TaxError, TaxRequest, TaxService};
pub use usage_store::{IngestOutcome, UsageStore};
pub use work_queue::{ScheduledTask, TaskKind, WorkQueue};
