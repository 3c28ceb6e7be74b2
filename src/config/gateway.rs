//! Payment gateway configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;

/// Payment gateway configuration (HTTP adapter)
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Gateway base URL
    pub endpoint: String,

    /// API key sent as a bearer token
    pub api_key: SecretString,

    /// Shared secret for notification signature verification
    pub webhook_secret: SecretString,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum accepted notification age in seconds
    #[serde(default = "default_tolerance")]
    pub notification_tolerance_secs: i64,
}

impl GatewayConfig {
    /// Validate gateway configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.endpoint.is_empty() {
            return Err(ValidationError::MissingRequired("GATEWAY__ENDPOINT"));
        }
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(ValidationError::InvalidGatewayEndpoint);
        }
        // Plain HTTP is for local mocks only.
        if !self.endpoint.starts_with("https://") && !self.endpoint.contains("localhost") {
            return Err(ValidationError::GatewayEndpointMustBeHttps);
        }
        if self.api_key.expose_secret().is_empty() {
            return Err(ValidationError::MissingRequired("GATEWAY__API_KEY"));
        }
        if self.webhook_secret.expose_secret().is_empty() {
            return Err(ValidationError::MissingRequired("GATEWAY__WEBHOOK_SECRET"));
        }
        if self.notification_tolerance_secs < 1 {
            return Err(ValidationError::InvalidNotificationTolerance);
        }
        Ok(())
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_tolerance() -> i64 {
    300
}
