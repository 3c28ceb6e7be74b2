//! Application configuration module
//!
//! Type-safe configuration loaded from environment variables via the
//! `config` and `dotenvy` crates. Variables use the `CYCLEBILL` prefix
//! with `__` separating nested values, e.g.
//! `CYCLEBILL__BILLING__GRACE_DAYS=7` -> `billing.grace_days = 7`.

mod billing;
mod database;
mod error;
mod gateway;
mod tax;

pub use billing::BillingConfig;
pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use gateway::GatewayConfig;
pub use tax::TaxConfig;

use serde::Deserialize;

/// Root application configuration
///
/// The gateway, tax, and database sections are optional: the daemon
/// falls back to in-memory adapters for any section left unset, which
/// keeps local runs dependency-free.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Billing knobs (due window, grace window, pause cap, sweep interval)
    #[serde(default)]
    pub billing: BillingConfig,

    /// Payment gateway credentials and endpoint
    pub gateway: Option<GatewayConfig>,

    /// Tax service credentials and endpoint
    pub tax: Option<TaxConfig>,

    /// PostgreSQL connection
    pub database: Option<DatabaseConfig>,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// Loads a `.env` file if present, then reads `CYCLEBILL`-prefixed
    /// environment variables into the typed sections.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("CYCLEBILL")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configured sections
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.billing.validate()?;
        if let Some(gateway) = &self.gateway {
            gateway.validate()?;
        }
        if let Some(tax) = &self.tax {
            tax.validate()?;
        }
        if let Some(database) = &self.database {
            database.validate()?;
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            billing: BillingConfig::default(),
            gateway: None,
            tax: None,
            database: None,
        }
    }
}
