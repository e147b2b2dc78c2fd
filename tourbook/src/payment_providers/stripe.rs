//! Stripe payment provider implementation
//!
//! Checkout sessions are created through the Stripe REST API with a form-encoded body; webhooks
//! are verified against the endpoint's signing secret before their payload is trusted.

use async_trait::async_trait;
use axum::http::HeaderMap;
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::{
    config::StripeConfig,
    payment_providers::{
        CheckoutRequest, CheckoutSession, CompletedCheckout, PaymentError, PaymentProvider, Result, WebhookEvent,
        signing::{SIGNATURE_HEADER, verify_signature},
    },
};

/// Stripe payment provider
pub struct StripeProvider {
    client: reqwest::Client,
    config: StripeConfig,
}

impl From<StripeConfig> for StripeProvider {
    fn from(config: StripeConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct Event {
    #[serde(rename = "type")]
    event_type: String,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CustomerDetails {
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CheckoutSessionObject {
    id: String,
    client_reference_id: Option<String>,
    customer_email: Option<String>,
    customer_details: Option<CustomerDetails>,
    amount_total: Option<i64>,
}

impl TryFrom<CheckoutSessionObject> for CompletedCheckout {
    type Error = PaymentError;

    fn try_from(session: CheckoutSessionObject) -> Result<Self> {
        let tour_id = session
            .client_reference_id
            .as_deref()
            .and_then(|id| Uuid::parse_str(id).ok())
            .ok_or_else(|| PaymentError::InvalidData("checkout session has no valid client_reference_id".to_string()))?;
        let customer_email = session
            .customer_email
            .or_else(|| session.customer_details.and_then(|d| d.email))
            .ok_or_else(|| PaymentError::InvalidData("checkout session has no customer email".to_string()))?;
        let amount_total = session
            .amount_total
            .ok_or_else(|| PaymentError::InvalidData("checkout session has no amount_total".to_string()))?;

        Ok(Self {
            session_id: session.id,
            tour_id,
            customer_email,
            amount_total,
        })
    }
}

impl StripeProvider {
    /// Form fields of a one-item payment-mode checkout session.
    fn session_form(&self, request: &CheckoutRequest) -> Vec<(String, String)> {
        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("payment_method_types[0]".to_string(), "card".to_string()),
            ("success_url".to_string(), request.success_url.clone()),
            ("cancel_url".to_string(), request.cancel_url.clone()),
            ("customer_email".to_string(), request.customer_email.clone()),
            ("client_reference_id".to_string(), request.tour_id.to_string()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("line_items[0][price_data][currency]".to_string(), self.config.currency.clone()),
            ("line_items[0][price_data][unit_amount]".to_string(), request.amount.to_string()),
            ("line_items[0][price_data][product_data][name]".to_string(), request.name.clone()),
        ];
        if !request.description.is_empty() {
            form.push((
                "line_items[0][price_data][product_data][description]".to_string(),
                request.description.clone(),
            ));
        }
        for (i, image) in request.images.iter().enumerate() {
            form.push((format!("line_items[0][price_data][product_data][images][{i}]"), image.clone()));
        }
        form
    }
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    #[instrument(skip(self, request), fields(tour_id = %request.tour_id), err)]
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession> {
        let body = serde_urlencoded::to_string(self.session_form(request))
            .map_err(|e| PaymentError::InvalidData(format!("encode checkout session: {e}")))?;

        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.config.api_base.trim_end_matches('/')))
            .bearer_auth(&self.config.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| PaymentError::ProviderApi(format!("send checkout session request: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ApiErrorBody>().await {
                Ok(body) => body.error.message,
                Err(_) => format!("status {status}"),
            };
            warn!(%status, "Stripe rejected checkout session: {message}");
            return Err(PaymentError::ProviderApi(message));
        }

        let session: SessionResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::ProviderApi(format!("decode checkout session: {e}")))?;
        debug!(session_id = %session.id, "Created Stripe checkout session");

        Ok(CheckoutSession {
            id: session.id,
            url: session.url,
            completed: None,
        })
    }

    fn validate_webhook(&self, headers: &HeaderMap, body: &[u8], now: i64) -> Result<WebhookEvent> {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .ok_or_else(|| PaymentError::InvalidData("Missing stripe-signature header".to_string()))?
            .to_str()
            .map_err(|_| PaymentError::InvalidData("Invalid stripe-signature header".to_string()))?;

        let tolerance = self.config.webhook_tolerance.as_secs() as i64;
        verify_signature(signature, body, &self.config.webhook_secret, now, tolerance)?;

        let event: Event = serde_json::from_slice(body).map_err(|e| PaymentError::InvalidData(format!("malformed event: {e}")))?;
        tracing::trace!("Validated Stripe webhook event: {}", event.event_type);

        if event.event_type != "checkout.session.completed" {
            return Ok(WebhookEvent::Other(event.event_type));
        }

        let session: CheckoutSessionObject =
            serde_json::from_value(event.data.object).map_err(|e| PaymentError::InvalidData(format!("malformed checkout session: {e}")))?;
        Ok(WebhookEvent::CheckoutCompleted(session.try_into()?))
    }
}
