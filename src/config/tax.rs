//! Tax service configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;

/// Tax service configuration (HTTP adapter)
#[derive(Debug, Clone, Deserialize)]
pub struct TaxConfig {
    /// Tax service base URL
    pub endpoint: String,

    /// API key sent as a bearer token
    pub api_key: SecretString,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Attempts before the invoice finalizes untaxed and flagged
    #[serde(default = "default_retries")]
    pub max_attempts: u32,
}

impl TaxConfig {
    /// Validate tax service configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.endpoint.is_empty() {
            return Err(ValidationError::MissingRequired("TAX__ENDPOINT"));
        }
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(ValidationError::InvalidTaxEndpoint);
        }
        if self.api_key.expose_secret().is_empty() {
            return Err(ValidationError::MissingRequired("TAX__API_KEY"));
        }
        if self.max_attempts == 0 || self.max_attempts > 10 {
            return Err(ValidationError::InvalidTaxRetries);
        }
        Ok(())
    }
}

fn default_timeout() -> u64 {
    10
}

fn default_retries() -> u32 {
    3
}
