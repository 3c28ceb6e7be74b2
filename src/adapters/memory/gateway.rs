//! Scriptable payment gateway for tests and local runs.
//!
//! Outcomes are queued ahead of time; the default when the script runs
//! dry is approval. Idempotency matches the real gateway contract: a key
//! that already resolved replays its outcome without a second charge.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::foundation::{IdempotencyKey, Timestamp};
use crate::ports::{
    ChargeOutcome, ChargeRequest, GatewayError, GatewayNotification, NotificationKind,
    PaymentGateway,
};

/// Next scripted behavior for a charge call.
#[derive(Debug, Clone)]
pub enum ScriptedCharge {
    Approve,
    Decline(String),
    /// Time out; `settled` controls whether the charge actually went
    /// through on the gateway side, which `query_status` will reveal.
    Timeout { settled: bool },
    Transient(String),
}

#[derive(Default)]
struct GatewayState {
    script: VecDeque<ScriptedCharge>,
    resolved: HashMap<IdempotencyKey, ChargeOutcome>,
    charges: Vec<ChargeRequest>,
    next_ref: u64,
}

#[derive(Default)]
pub struct MockGateway {
    state: Mutex<GatewayState>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, GatewayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn script(&self, step: ScriptedCharge) {
        self.guard().script.push_back(step);
    }

    /// Every charge request the gateway has seen, including replays.
    pub fn charges(&self) -> Vec<ChargeRequest> {
        self.guard().charges.clone()
    }

    /// Charges that actually resolved (replays collapse into one).
    pub fn settled_count(&self) -> usize {
        self.guard()
            .resolved
            .values()
            .filter(|o| matches!(o, ChargeOutcome::Approved { .. }))
            .count()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome, GatewayError> {
        let mut state = self.guard();
        state.charges.push(request.clone());

        if let Some(outcome) = state.resolved.get(&request.idempotency_key) {
            return Ok(outcome.clone());
        }

        let step = state.script.pop_front().unwrap_or(ScriptedCharge::Approve);
        match step {
            ScriptedCharge::Approve => {
                state.next_ref += 1;
                let outcome = ChargeOutcome::Approved {
                    transaction_ref: format!("txn_{:06}", state.next_ref),
                };
                state
                    .resolved
                    .insert(request.idempotency_key.clone(), outcome.clone());
                Ok(outcome)
            }
            ScriptedCharge::Decline(reason) => {
                let outcome = ChargeOutcome::Declined { reason };
                state
                    .resolved
                    .insert(request.idempotency_key.clone(), outcome.clone());
                Ok(outcome)
            }
            ScriptedCharge::Timeout { settled } => {
                if settled {
                    state.next_ref += 1;
                    let outcome = ChargeOutcome::Approved {
                        transaction_ref: format!("txn_{:06}", state.next_ref),
                    };
                    state.resolved.insert(request.idempotency_key.clone(), outcome);
                }
                Err(GatewayError::Timeout)
            }
            ScriptedCharge::Transient(reason) => Err(GatewayError::Transient(reason)),
        }
    }

    async fn query_status(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<ChargeOutcome>, GatewayError> {
        Ok(self.guard().resolved.get(key).cloned())
    }

    fn verify_notification(
        &self,
        payload: &[u8],
        signature: &str,
        now: Timestamp,
    ) -> Result<GatewayNotification, GatewayError> {
        if signature == "invalid" {
            return Err(GatewayError::InvalidSignature("bad signature".into()));
        }
        let parsed: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| GatewayError::Permanent(format!("unparseable notification: {}", e)))?;
        let key = parsed["idempotency_key"]
            .as_str()
            .ok_or_else(|| GatewayError::Permanent("missing idempotency_key".into()))?;
        let key = IdempotencyKey::new(key)
            .map_err(|e| GatewayError::Permanent(e.to_string()))?;
        let transaction_ref = parsed["transaction_ref"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let kind = match parsed["kind"].as_str() {
            Some("settled") => NotificationKind::Settled,
            _ => NotificationKind::Failed,
        };
        let sent_at = parsed["sent_at"]
            .as_i64()
            .map(Timestamp::from_unix_secs)
            .unwrap_or(now);
        Ok(GatewayNotification {
            idempotency_key: key,
            transaction_ref,
            kind,
            sent_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{AccountId, Currency, InvoiceId, Money};

    fn request(key: &IdempotencyKey) -> ChargeRequest {
        ChargeRequest {
            idempotency_key: key.clone(),
            account_id: AccountId::new(),
            invoice_id: InvoiceId::new(),
            amount: Money::from_cents(4900, Currency::usd()),
            payment_method: "pm_test".into(),
        }
    }

    #[tokio::test]
    async fn same_key_replays_without_a_second_settlement() {
        let gateway = MockGateway::new();
        let key = IdempotencyKey::generate();

        let first = gateway.charge(&request(&key)).await.unwrap();
        let second = gateway.charge(&request(&key)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(gateway.charges().len(), 2);
        assert_eq!(gateway.settled_count(), 1);
    }

    #[tokio::test]
    async fn settled_timeout_is_visible_to_query_status() {
        let gateway = MockGateway::new();
        gateway.script(ScriptedCharge::Timeout { settled: true });
        let key = IdempotencyKey::generate();

        assert!(matches!(
            gateway.charge(&request(&key)).await,
            Err(GatewayError::Timeout)
        ));
        assert!(matches!(
            gateway.query_status(&key).await.unwrap(),
            Some(ChargeOutcome::Approved { .. })
        ));
    }

    #[tokio::test]
    async fn unsettled_timeout_leaves_no_trace() {
        let gateway = MockGateway::new();
        gateway.script(ScriptedCharge::Timeout { settled: false });
        let key = IdempotencyKey::generate();

        assert!(gateway.charge(&request(&key)).await.is_err());
        assert!(gateway.query_status(&key).await.unwrap().is_none());
    }
}
