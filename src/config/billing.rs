//! Billing knobs

use serde::Deserialize;

use super::error::ValidationError;

/// Billing configuration: windows and caps the engine runs on.
///
/// The retry ladder and dunning thresholds are fixed in the domain; what
/// varies per deployment is how long invoices stay collectible before
/// they are due, how long late usage is accepted, and how long a pause
/// may run.
#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    /// Days between finalization and the invoice due date
    #[serde(default = "default_due_days")]
    pub due_days: i64,

    /// Days after period close during which late usage is still billed
    #[serde(default = "default_grace_days")]
    pub grace_days: u32,

    /// Days a subscription may stay paused before it is cancelled
    #[serde(default = "default_max_pause_days")]
    pub max_pause_days: i64,

    /// Seconds between sweep passes
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            due_days: default_due_days(),
            grace_days: default_grace_days(),
            max_pause_days: default_max_pause_days(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl BillingConfig {
    /// Validate billing configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.due_days < 1 {
            return Err(ValidationError::InvalidDueDays);
        }
        if self.grace_days > 31 {
            return Err(ValidationError::GraceWindowTooLarge);
        }
        if self.max_pause_days < 1 {
            return Err(ValidationError::InvalidPauseCap);
        }
        if self.sweep_interval_secs == 0 {
            return Err(ValidationError::InvalidSweepInterval);
        }
        Ok(())
    }
}

fn default_due_days() -> i64 {
    14
}

fn default_grace_days() -> u32 {
    7
}

fn default_max_pause_days() -> i64 {
    90
}

fn default_sweep_interval() -> u64 {
    300
}
