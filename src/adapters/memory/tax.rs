//! Tax service doubles.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::ports::{TaxAssessment, TaxError, TaxRequest, TaxService};

/// Applies one flat rate to every jurisdiction. Rate is in basis points
/// (875 = 8.75%); tax floors to whole cents.
pub struct FlatRateTaxService {
    rate_bps: i64,
    unavailable: AtomicBool,
}

impl FlatRateTaxService {
    pub fn new(rate_bps: i64) -> Self {
        Self {
            rate_bps,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Makes subsequent calls fail as unavailable, for degradation tests.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl TaxService for FlatRateTaxService {
    async fn assess(&self, request: &TaxRequest) -> Result<TaxAssessment, TaxError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(TaxError::Unavailable("scripted outage".into()));
        }
        let tax_cents = (request.taxable_cents as i128 * self.rate_bps as i128 / 10_000) as i64;
        Ok(TaxAssessment {
            tax_cents,
            description: format!(
                "Tax ({}, {:.2}%)",
                request.jurisdiction,
                self.rate_bps as f64 / 100.0
            ),
        })
    }
}
