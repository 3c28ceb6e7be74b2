//! In-memory adapters: full port implementations for tests and local runs.

mod clock;
mod gateway;
mod ledger;
mod lock;
mod notify;
mod repositories;
mod tax;
mod usage;

pub use clock::ManualClock;
pub use gateway::{MockGateway, ScriptedCharge};
pub use ledger::{InMemoryDunningLedger, InMemoryWorkQueue};
pub use lock::InMemoryEntityLock;
pub use notify::RecordingNotifier;
pub use repositories::{
    InMemoryBillingProfiles, InMemoryCreditRepository, InMemoryHistoryStore,
    InMemoryInvoiceRepository, InMemoryPaymentAttemptRepository, InMemoryPlanRepository,
    InMemorySubscriptionRepository,
};
pub use tax::FlatRateTaxService;
pub use usage::InMemoryUsageStore;
