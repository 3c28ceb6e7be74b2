//! Error types for the billing domain.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use thiserror::Error;

/// Errors that occur during value object construction.
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Field '{field}' cannot be empty")]
    EmptyField { field: String },

    #[error("Field '{field}' must be between {min} and {max}, got {actual}")]
    OutOfRange {
        field: String,
        min: i64,
        max: i64,
        actual: i64,
    },

    #[error("Field '{field}' has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

impl ValidationError {
    /// Creates an empty field validation error.
    pub fn empty_field(field: impl Into<String>) -> Self {
        ValidationError::EmptyField {
            field: field.into(),
        }
    }

    /// Creates an out of range validation error.
    pub fn out_of_range(field: impl Into<String>, min: i64, max: i64, actual: i64) -> Self {
        ValidationError::OutOfRange {
            field: field.into(),
            min,
            max,
            actual,
        }
    }

    /// Creates an invalid format validation error.
    pub fn invalid_format(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFormat {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Error codes organized by category.
///
/// Every user-visible failure carries one of these machine-readable codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Validation errors (rejected before any state change)
    ValidationFailed,
    EmptyField,
    OutOfRange,
    InvalidFormat,

    // Not found errors
    SubscriptionNotFound,
    PlanNotFound,
    InvoiceNotFound,
    AttemptNotFound,
    AccountNotFound,

    // Conflict errors
    Conflict,
    DuplicateSubscription,
    InvoiceFinalized,
    IdempotencyConflict,
    InvalidStateTransition,

    // External collaborator errors
    GatewayTransient,
    GatewayPermanent,
    TaxUnavailable,
    PaymentRequired,

    // Infrastructure errors
    DatabaseError,
    LockUnavailable,
    InternalError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ErrorCode::EmptyField => "EMPTY_FIELD",
            ErrorCode::OutOfRange => "OUT_OF_RANGE",
            ErrorCode::InvalidFormat => "INVALID_FORMAT",
            ErrorCode::SubscriptionNotFound => "SUBSCRIPTION_NOT_FOUND",
            ErrorCode::PlanNotFound => "PLAN_NOT_FOUND",
            ErrorCode::InvoiceNotFound => "INVOICE_NOT_FOUND",
            ErrorCode::AttemptNotFound => "ATTEMPT_NOT_FOUND",
            ErrorCode::AccountNotFound => "ACCOUNT_NOT_FOUND",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::DuplicateSubscription => "DUPLICATE_SUBSCRIPTION",
            ErrorCode::InvoiceFinalized => "INVOICE_FINALIZED",
            ErrorCode::IdempotencyConflict => "IDEMPOTENCY_CONFLICT",
            ErrorCode::InvalidStateTransition => "INVALID_STATE_TRANSITION",
            ErrorCode::GatewayTransient => "GATEWAY_TRANSIENT",
            ErrorCode::GatewayPermanent => "GATEWAY_PERMANENT",
            ErrorCode::TaxUnavailable => "TAX_UNAVAILABLE",
            ErrorCode::PaymentRequired => "PAYMENT_REQUIRED",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::LockUnavailable => "LOCK_UNAVAILABLE",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        };
        write!(f, "{}", s)
    }
}

/// Standard billing error with code, message, details, and an optional
/// human remediation hint (e.g. "add a payment method").
#[derive(Debug, Clone)]
pub struct BillingError {
    pub code: ErrorCode,
    pub message: String,
    pub details: HashMap<String, String>,
    pub remediation: Option<String>,
}

impl BillingError {
    /// Creates a new billing error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: HashMap::new(),
            remediation: None,
        }
    }

    /// Creates a validation error for a specific field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message).with_detail("field", field)
    }

    /// Creates a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    /// Creates a not-found error with the appropriate code per entity.
    pub fn not_found(code: ErrorCode, entity: impl fmt::Display) -> Self {
        Self::new(code, format!("{} not found", entity))
    }

    /// Creates an idempotency conflict error (same key, different parameters).
    pub fn idempotency_conflict(key: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::IdempotencyConflict,
            format!("idempotency key '{}' was already used with different parameters", key),
        )
    }

    /// Creates an invalid state transition error.
    pub fn invalid_transition(entity: &str, from: impl fmt::Debug, to: impl fmt::Debug) -> Self {
        Self::new(
            ErrorCode::InvalidStateTransition,
            format!("Cannot transition {} from {:?} to {:?}", entity, from, to),
        )
    }

    /// Adds a detail to the error.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Attaches a human remediation hint.
    pub fn with_remediation(mut self, hint: impl Into<String>) -> Self {
        self.remediation = Some(hint.into());
        self
    }

    /// True if the operation may succeed if retried later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::GatewayTransient | ErrorCode::TaxUnavailable | ErrorCode::LockUnavailable
        )
    }
}

impl fmt::Display for BillingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl Error for BillingError {}

impl From<ValidationError> for BillingError {
    fn from(err: ValidationError) -> Self {
        let code = match &err {
            ValidationError::EmptyField { .. } => ErrorCode::EmptyField,
            ValidationError::OutOfRange { .. } => ErrorCode::OutOfRange,
            ValidationError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
        };
        BillingError::new(code, err.to_string())
    }
}
