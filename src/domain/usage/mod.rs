//! Usage metering: idempotent records and tiered charge computation.

mod record;
mod tiering;

pub use record::UsageRecord;
pub use tiering::{marginal_charge_cents, tiered_charge_cents};
