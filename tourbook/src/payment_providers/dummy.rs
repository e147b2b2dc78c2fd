//! Dummy payment provider implementation
//!
//! Checkouts complete immediately without any external payment: the customer is sent straight
//! to the success URL and the booking is recorded at once. Useful for testing and development.

use async_trait::async_trait;
use axum::http::HeaderMap;

use crate::{
    config::DummyConfig,
    payment_providers::{CheckoutRequest, CheckoutSession, CompletedCheckout, PaymentError, PaymentProvider, Result, WebhookEvent},
};

/// Dummy payment provider that settles every checkout instantly
pub struct DummyProvider;

impl From<DummyConfig> for DummyProvider {
    fn from(_config: DummyConfig) -> Self {
        Self
    }
}

#[async_trait]
impl PaymentProvider for DummyProvider {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession> {
        let session_id = format!("dummy_session_{}", uuid::Uuid::new_v4());
        tracing::info!("Dummy provider created checkout session {} for tour {}", session_id, request.tour_id);

        Ok(CheckoutSession {
            id: session_id.clone(),
            url: request.success_url.clone(),
            completed: Some(CompletedCheckout {
                session_id,
                tour_id: request.tour_id,
                customer_email: request.customer_email.clone(),
                amount_total: request.amount,
            }),
        })
    }

    fn validate_webhook(&self, _headers: &HeaderMap, _body: &[u8], _now: i64) -> Result<WebhookEvent> {
        Err(PaymentError::InvalidData("the dummy payment provider does not accept webhooks".to_string()))
    }
}
