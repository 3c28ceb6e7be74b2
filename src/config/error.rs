//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invoice due window must be at least one day")]
    InvalidDueDays,

    #[error("Late-usage grace window exceeds maximum allowed (31 days)")]
    GraceWindowTooLarge,

    #[error("Pause cap must be at least one day")]
    InvalidPauseCap,

    #[error("Sweep interval must be at least one second")]
    InvalidSweepInterval,

    #[error("Invalid gateway endpoint URL")]
    InvalidGatewayEndpoint,

    #[error("Gateway endpoint must use HTTPS")]
    GatewayEndpointMustBeHttps,

    #[error("Notification tolerance must be at least one second")]
    InvalidNotificationTolerance,

    #[error("Invalid tax service endpoint URL")]
    InvalidTaxEndpoint,

    #[error("Tax retry attempts must be between 1 and 10")]
    InvalidTaxRetries,

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Pool min_connections exceeds max_connections")]
    InvalidPoolSize,
}
