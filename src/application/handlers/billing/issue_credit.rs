//! Issuing account credits.

use std::sync::Arc;
use tracing::info;

use crate::domain::foundation::{AccountId, BillingError, Currency, ErrorCode};
use crate::domain::invoice::Credit;
use crate::ports::{BillingProfiles, Clock, CreditRepository};

pub struct IssueCredit {
    credits: Arc<dyn CreditRepository>,
    profiles: Arc<dyn BillingProfiles>,
    clock: Arc<dyn Clock>,
}

impl IssueCredit {
    pub fn new(
        credits: Arc<dyn CreditRepository>,
        profiles: Arc<dyn BillingProfiles>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            credits,
            profiles,
            clock,
        }
    }

    pub async fn execute(
        &self,
        account_id: AccountId,
        cents: i64,
        currency: Currency,
        reason: impl Into<String>,
    ) -> Result<Credit, BillingError> {
        if self.profiles.find(account_id).await?.is_none() {
            return Err(BillingError::not_found(ErrorCode::AccountNotFound, account_id));
        }
        let credit = Credit::issue(account_id, cents, currency, reason, self.clock.now())?;
        self.credits.save(&credit).await?;
        info!(
            account_id = %account_id,
            credit_id = %credit.id(),
            amount = cents,
            reason = credit.reason(),
            "credit issued"
        );
        Ok(credit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryBillingProfiles, InMemoryCreditRepository, ManualClock};
    use crate::domain::foundation::Timestamp;
    use crate::ports::BillingProfile;

    async fn handler_with_account() -> (IssueCredit, Arc<InMemoryCreditRepository>, AccountId) {
        let credits = Arc::new(InMemoryCreditRepository::new());
        let profiles = Arc::new(InMemoryBillingProfiles::new());
        let account_id = AccountId::new();
        profiles
            .save(&BillingProfile {
                account_id,
                jurisdiction: "US-NY".into(),
                tax_exempt: false,
                vat_id: None,
                payment_method: None,
            })
            .await
            .unwrap();
        let handler = IssueCredit::new(
            credits.clone(),
            profiles,
            Arc::new(ManualClock::at(Timestamp::now())),
        );
        (handler, credits, account_id)
    }

    #[tokio::test]
    async fn issues_and_persists() {
        let (handler, credits, account_id) = handler_with_account().await;
        let credit = handler
            .execute(account_id, 2500, Currency::usd(), "goodwill")
            .await
            .unwrap();
        assert_eq!(credit.remaining_cents(), 2500);
        assert!(credits.find(credit.id()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unknown_account_is_rejected() {
        let (handler, _, _) = handler_with_account().await;
        let err = handler
            .execute(AccountId::new(), 2500, Currency::usd(), "goodwill")
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::AccountNotFound);
    }

    #[tokio::test]
    async fn invalid_amount_is_rejected() {
        let (handler, _, account_id) = handler_with_account().await;
        assert!(handler
            .execute(account_id, 0, Currency::usd(), "goodwill")
            .await
            .is_err());
    }
}
