//! Periodic sweeps.
//!
//! Each sweep iterates independently over the entities due for action and
//! logs-and-continues on per-item failure, so one bad subscription never
//! stalls the rest of the pass. Per-entity serialization happens inside
//! the handlers each sweep delegates to.

mod billing_cycle;
mod dunning;
mod pause_expiry;
mod payment_retry;

pub use billing_cycle::BillingCycleSweep;
pub use dunning::DunningSweep;
pub use pause_expiry::PauseExpirySweep;
pub use payment_retry::PaymentRetrySweep;

/// What one pass of a sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub processed: usize,
    pub failed: usize,
}

impl SweepReport {
    pub(crate) fn ok(&mut self) {
        self.processed += 1;
    }

    pub(crate) fn err(&mut self) {
        self.failed += 1;
    }
}
