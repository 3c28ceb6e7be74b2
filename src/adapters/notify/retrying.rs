//! Retry decorator for notification delivery.
//!
//! Wraps any notifier and retries failed sends with exponential backoff,
//! five attempts in total. Delivery stays best-effort: the final error is
//! returned to the caller, who logs it and moves on.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::ports::{Notification, Notifier, NotifyError};

const MAX_ATTEMPTS: u32 = 5;
const BASE_DELAY_MS: u64 = 100;

pub struct RetryingNotifier {
    inner: Arc<dyn Notifier>,
}

impl RetryingNotifier {
    pub fn new(inner: Arc<dyn Notifier>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Notifier for RetryingNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        let mut last = NotifyError("no attempts made".into());
        for attempt in 1..=MAX_ATTEMPTS {
            match self.inner.notify(notification.clone()).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    warn!(attempt, max_attempts = MAX_ATTEMPTS, %err, "notification send failed");
                    last = err;
                    if attempt < MAX_ATTEMPTS {
                        let delay = BASE_DELAY_MS * 2u64.pow(attempt - 1);
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                }
            }
        }
        Err(last)
    }
}
