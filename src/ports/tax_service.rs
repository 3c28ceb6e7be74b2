//! The external tax assessment service.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::foundation::{BillingError, Currency, ErrorCode};

#[derive(Debug, Clone)]
pub struct TaxRequest {
    pub jurisdiction: String,
    pub taxable_cents: i64,
    pub currency: Currency,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxAssessment {
    pub tax_cents: i64,
    pub description: String,
}

#[derive(Debug, Clone, Error)]
pub enum TaxError {
    /// The service could not answer; invoicing degrades by finalizing
    /// without tax and flagging the invoice for review.
    #[error("tax service unavailable: {0}")]
    Unavailable(String),

    #[error("tax service rejected the request: {0}")]
    Rejected(String),
}

impl From<TaxError> for BillingError {
    fn from(err: TaxError) -> Self {
        let code = match err {
            TaxError::Unavailable(_) => ErrorCode::TaxUnavailable,
            TaxError::Rejected(_) => ErrorCode::ValidationFailed,
        };
        BillingError::new(code, err.to_string())
    }
}

#[async_trait]
pub trait TaxService: Send + Sync {
    async fn assess(&self, request: &TaxRequest) -> Result<TaxAssessment, TaxError>;
}
