//! The external payment gateway.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::foundation::{
    AccountId, BillingError, ErrorCode, IdempotencyKey, InvoiceId, Money, Timestamp,
};

/// A charge submission. The gateway deduplicates on the idempotency key.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub idempotency_key: IdempotencyKey,
    pub account_id: AccountId,
    pub invoice_id: InvoiceId,
    pub amount: Money,
    pub payment_method: String,
}

/// A definitive answer from the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    Approved { transaction_ref: String },
    Declined { reason: String },
}

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// No response in time; the charge outcome is unknown.
    #[error("gateway timed out")]
    Timeout,

    #[error("gateway transient failure: {0}")]
    Transient(String),

    #[error("gateway rejected the request: {0}")]
    Permanent(String),

    #[error("notification signature rejected: {0}")]
    InvalidSignature(String),
}

impl From<GatewayError> for BillingError {
    fn from(err: GatewayError) -> Self {
        let code = match err {
            GatewayError::Timeout | GatewayError::Transient(_) => ErrorCode::GatewayTransient,
            GatewayError::Permanent(_) | GatewayError::InvalidSignature(_) => {
                ErrorCode::GatewayPermanent
            }
        };
        BillingError::new(code, err.to_string())
    }
}

/// What an asynchronous gateway notification says happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationKind {
    Settled,
    Failed,
}

/// A verified, parsed gateway notification.
#[derive(Debug, Clone)]
pub struct GatewayNotification {
    pub idempotency_key: IdempotencyKey,
    pub transaction_ref: String,
    pub kind: NotificationKind,
    pub sent_at: Timestamp,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Submits a charge. Resubmitting the same idempotency key must not
    /// charge twice; the gateway replays the original outcome.
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome, GatewayError>;

    /// Asks the gateway what became of a charge, by idempotency key.
    /// `None` means the gateway never saw it.
    async fn query_status(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<ChargeOutcome>, GatewayError>;

    /// Verifies a notification's signature and timestamp and parses it.
    fn verify_notification(
        &self,
        payload: &[u8],
        signature: &str,
        now: Timestamp,
    ) -> Result<GatewayNotification, GatewayError>;
}
