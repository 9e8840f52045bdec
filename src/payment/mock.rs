//! Test/dry-run provider that hands out redirect URLs without
//! talking to any gateway.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;
use url::Url;

use super::{PaymentOrder, PaymentProvider, PaymentSession, SupportedProvider};

#[derive(Debug, Clone)]
pub struct MockProvider {
    session_counter: Arc<AtomicU64>,
    should_fail: bool,
    failure_message: String,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            session_counter: Arc::new(AtomicU64::new(1)),
            should_fail: false,
            failure_message: String::new(),
        }
    }

    pub fn with_failure(message: impl Into<String>) -> Self {
        Self {
            session_counter: Arc::new(AtomicU64::new(1)),
            should_fail: true,
            failure_message: message.into(),
        }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Mock provider failure: {0}")]
pub struct MockProviderError(String);

#[async_trait]
impl PaymentProvider for MockProvider {
    type Error = MockProviderError;

    async fn create_payment(&self, order: &PaymentOrder) -> Result<PaymentSession, Self::Error> {
        if self.should_fail {
            return Err(MockProviderError(self.failure_message.clone()));
        }

        let id = self.session_counter.fetch_add(1, Ordering::SeqCst);
        let reference = format!("MOCK_{id}");

        warn!(
            "[MOCK] Would register payment of {} NOK for order {} (reference: {})",
            order.amount, order.order_id, reference
        );

        let redirect_url = format!("https://pay.example.invalid/mock/{id}")
            .parse::<Url>()
            .map_err(|e| MockProviderError(e.to_string()))?;

        Ok(PaymentSession {
            reference,
            redirect_url,
        })
    }

    fn to_supported_provider(&self) -> SupportedProvider {
        SupportedProvider::Mock
    }
}
