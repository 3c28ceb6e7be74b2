//! HTTP tax service adapter.
//!
//! Transient failures are retried a bounded number of times with a short
//! backoff; once the budget is spent the caller sees `Unavailable` and
//! invoicing degrades to untaxed-and-flagged. 4xx answers are `Rejected`
//! immediately, retrying would not change them.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

use crate::config::TaxConfig;
use crate::ports::{TaxAssessment, TaxError, TaxRequest, TaxService};

const RETRY_BASE_DELAY_MS: u64 = 200;

#[derive(Debug, Deserialize)]
struct TaxResponse {
    tax_cents: i64,
    #[serde(default)]
    description: String,
}

pub struct HttpTaxService {
    endpoint: String,
    api_key: SecretString,
    max_attempts: u32,
    client: reqwest::Client,
}

impl HttpTaxService {
    pub fn new(config: &TaxConfig) -> Result<Self, TaxError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TaxError::Unavailable(format!("http client: {}", e)))?;
        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            max_attempts: config.max_attempts.max(1),
            client,
        })
    }

    async fn assess_once(&self, request: &TaxRequest) -> Result<TaxAssessment, TaxError> {
        let body = serde_json::json!({
            "jurisdiction": request.jurisdiction,
            "taxable_cents": request.taxable_cents,
            "currency": request.currency.as_str(),
        });
        let response = self
            .client
            .post(format!("{}/v1/assessments", self.endpoint))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| TaxError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(TaxError::Rejected(format!("{}: {}", status, body)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TaxError::Unavailable(format!("{}: {}", status, body)));
        }
        let parsed: TaxResponse = response
            .json()
            .await
            .map_err(|e| TaxError::Unavailable(format!("unparseable response: {}", e)))?;
        Ok(TaxAssessment {
            tax_cents: parsed.tax_cents,
            description: if parsed.description.is_empty() {
                "Tax".to_string()
            } else {
                parsed.description
            },
        })
    }
}

#[async_trait]
impl TaxService for HttpTaxService {
    async fn assess(&self, request: &TaxRequest) -> Result<TaxAssessment, TaxError> {
        let mut last = None;
        for attempt in 1..=self.max_attempts {
            match self.assess_once(request).await {
                Ok(assessment) => return Ok(assessment),
                Err(TaxError::Rejected(reason)) => return Err(TaxError::Rejected(reason)),
                Err(err) => {
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        %err,
                        "tax assessment attempt failed"
                    );
                    last = Some(err);
                    if attempt < self.max_attempts {
                        let delay = RETRY_BASE_DELAY_MS * 2u64.pow(attempt - 1);
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                }
            }
        }
        Err(last.unwrap_or_else(|| TaxError::Unavailable("no attempts made".into())))
    }
}
