//! HTTP payment gateway adapter.
//!
//! Talks to the external gateway over REST and verifies its asynchronous
//! notifications. Signatures are HMAC-SHA256 over `timestamp.payload` in
//! a `t=<unix>,v1=<hex>` header, compared in constant time, with a
//! timestamp window against replays.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::config::GatewayConfig;
use crate::domain::foundation::{hex_encode, IdempotencyKey, Timestamp};
use crate::ports::{
    ChargeOutcome, ChargeRequest, GatewayError, GatewayNotification, NotificationKind,
    PaymentGateway,
};

type HmacSha256 = Hmac<Sha256>;

/// Clock skew tolerance for notification timestamps in the future.
const MAX_FUTURE_SKEW_SECS: i64 = 60;

#[derive(Debug, Deserialize)]
struct ChargeResponse {
    status: String,
    #[serde(default)]
    transaction_ref: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NotificationPayload {
    idempotency_key: String,
    #[serde(default)]
    transaction_ref: Option<String>,
    kind: String,
    sent_at: i64,
}

pub struct HttpPaymentGateway {
    endpoint: String,
    api_key: SecretString,
    webhook_secret: SecretString,
    tolerance_secs: i64,
    client: reqwest::Client,
}

impl HttpPaymentGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Permanent(format!("http client: {}", e)))?;
        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            webhook_secret: config.webhook_secret.clone(),
            tolerance_secs: config.notification_tolerance_secs,
            client,
        })
    }

    fn outcome_from(&self, response: ChargeResponse) -> Result<ChargeOutcome, GatewayError> {
        match response.status.as_str() {
            "approved" => Ok(ChargeOutcome::Approved {
                transaction_ref: response.transaction_ref.unwrap_or_default(),
            }),
            "declined" => Ok(ChargeOutcome::Declined {
                reason: response.reason.unwrap_or_else(|| "declined".to_string()),
            }),
            other => Err(GatewayError::Permanent(format!(
                "unrecognized charge status: {}",
                other
            ))),
        }
    }

    fn map_send_error(err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::Timeout
        } else {
            GatewayError::Transient(err.to_string())
        }
    }

    fn map_status(status: reqwest::StatusCode, body: String) -> GatewayError {
        if status.is_server_error() {
            GatewayError::Transient(format!("gateway returned {}: {}", status, body))
        } else {
            GatewayError::Permanent(format!("gateway returned {}: {}", status, body))
        }
    }

    /// Checks `t=<unix>,v1=<hex>` against HMAC-SHA256 of `t.payload`.
    fn check_signature(
        &self,
        payload: &[u8],
        signature: &str,
        now: Timestamp,
    ) -> Result<(), GatewayError> {
        let mut timestamp: Option<i64> = None;
        let mut provided: Option<Vec<u8>> = None;
        for part in signature.split(',') {
            let Some((key, value)) = part.split_once('=') else {
                return Err(GatewayError::InvalidSignature(
                    "malformed signature header".into(),
                ));
            };
            match key.trim() {
                "t" => {
                    timestamp = Some(value.trim().parse().map_err(|_| {
                        GatewayError::InvalidSignature("invalid timestamp".into())
                    })?);
                }
                "v1" => {
                    provided = Some(hex_decode(value.trim()).ok_or_else(|| {
                        GatewayError::InvalidSignature("signature is not hex".into())
                    })?);
                }
                // Unknown fields are ignored for forward compatibility.
                _ => {}
            }
        }
        let timestamp = timestamp
            .ok_or_else(|| GatewayError::InvalidSignature("missing timestamp".into()))?;
        let provided = provided
            .ok_or_else(|| GatewayError::InvalidSignature("missing v1 signature".into()))?;

        let age = now.as_unix_secs() - timestamp;
        if age > self.tolerance_secs {
            warn!(age_secs = age, "notification too old, possible replay");
            return Err(GatewayError::InvalidSignature(format!(
                "notification too old ({} seconds)",
                age
            )));
        }
        if age < -MAX_FUTURE_SKEW_SECS {
            warn!(age_secs = age, "notification timestamp in the future");
            return Err(GatewayError::InvalidSignature(
                "notification timestamp in the future".into(),
            ));
        }

        let signed = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.expose_secret().as_bytes())
            .map_err(|e| GatewayError::InvalidSignature(e.to_string()))?;
        mac.update(signed.as_bytes());
        let expected = mac.finalize().into_bytes();

        if expected.as_slice().ct_eq(provided.as_slice()).unwrap_u8() != 1 {
            warn!(
                expected = hex_encode(expected.as_slice()),
                "notification signature mismatch"
            );
            return Err(GatewayError::InvalidSignature("signature mismatch".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome, GatewayError> {
        let body = serde_json::json!({
            "idempotency_key": request.idempotency_key.as_str(),
            "account_id": request.account_id.to_string(),
            "invoice_id": request.invoice_id.to_string(),
            "amount_cents": request.amount.cents(),
            "currency": request.amount.currency().as_str(),
            "payment_method": request.payment_method,
        });
        let response = self
            .client
            .post(format!("{}/v1/charges", self.endpoint))
            .bearer_auth(self.api_key.expose_secret())
            .header("Idempotency-Key", request.idempotency_key.as_str())
            .json(&body)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_status(status, body));
        }
        let parsed: ChargeResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Transient(format!("unparseable response: {}", e)))?;
        self.outcome_from(parsed)
    }

    async fn query_status(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<ChargeOutcome>, GatewayError> {
        let response = self
            .client
            .get(format!("{}/v1/charges/{}", self.endpoint, key.as_str()))
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await
            .map_err(Self::map_send_error)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_status(status, body));
        }
        let parsed: ChargeResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Transient(format!("unparseable response: {}", e)))?;
        self.outcome_from(parsed).map(Some)
    }

    fn verify_notification(
        &self,
        payload: &[u8],
        signature: &str,
        now: Timestamp,
    ) -> Result<GatewayNotification, GatewayError> {
        self.check_signature(payload, signature, now)?;

        let parsed: NotificationPayload = serde_json::from_slice(payload)
            .map_err(|e| GatewayError::Permanent(format!("unparseable notification: {}", e)))?;
        let idempotency_key = IdempotencyKey::new(parsed.idempotency_key)
            .map_err(|e| GatewayError::Permanent(e.to_string()))?;
        let kind = match parsed.kind.as_str() {
            "settled" => NotificationKind::Settled,
            "failed" => NotificationKind::Failed,
            other => {
                return Err(GatewayError::Permanent(format!(
                    "unrecognized notification kind: {}",
                    other
                )));
            }
        };
        Ok(GatewayNotification {
            idempotency_key,
            transaction_ref: parsed.transaction_ref.unwrap_or_default(),
            kind,
            sent_at: Timestamp::from_unix_secs(parsed.sent_at),
        })
    }
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}
