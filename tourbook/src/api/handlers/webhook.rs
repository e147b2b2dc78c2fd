//! Payment provider webhook.
//!
//! Mounted outside `/api/v1` and before any JSON parsing: the signature covers the raw body.

use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use chrono::Utc;
use serde::Serialize;

use crate::{
    AppState,
    errors::{Error, Result},
    payment_providers::{WebhookEvent, record_checkout},
};

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

/// Receive a signed payment event. Not part of the client API document.
#[tracing::instrument(skip_all)]
pub async fn checkout_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Json<WebhookAck>> {
    let Some(provider) = state.payments.as_ref() else {
        tracing::warn!("Webhook called but no payment provider is configured");
        return Err(Error::BadRequest {
            message: "Webhook error: payments are not configured".to_string(),
        });
    };

    let event = provider.validate_webhook(&headers, &body, Utc::now().timestamp()).map_err(|e| {
        tracing::warn!("Rejected webhook: {e}");
        Error::from(e)
    })?;

    match event {
        // Authentic from here on: recording failures are logged, never returned
        WebhookEvent::CheckoutCompleted(checkout) => match state.db.acquire().await {
            Ok(mut conn) => {
                if let Err(e) = record_checkout(&mut conn, &checkout).await {
                    tracing::error!(session_id = %checkout.session_id, "Failed to record booking for checkout: {e}");
                }
            }
            Err(e) => tracing::error!(session_id = %checkout.session_id, "Failed to acquire connection for checkout: {e}"),
        },
        WebhookEvent::Other(event_type) => {
            tracing::debug!(event_type = %event_type, "Ignoring webhook event");
        }
    }

    Ok(Json(WebhookAck { received: true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::models::users::Role,
        config::{PaymentConfig, StripeConfig},
        db::handlers::Bookings,
        payment_providers::{create_provider, signing::{SIGNATURE_HEADER, sign_payload}},
        test_utils::{create_test_app_with, create_test_config, create_test_state_with, create_test_tour, create_test_user},
    };
    use axum::http::{HeaderName, HeaderValue, StatusCode};
    use serde_json::{Value, json};
    use sqlx::SqlitePool;
    use std::{sync::Arc, time::Duration};

    const SECRET: &str = "whsec_test";

    fn stripe_state(pool: SqlitePool) -> AppState {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
        let provider = create_provider(PaymentConfig::Stripe(StripeConfig {
            api_key: "sk_test_123".to_string(),
            webhook_secret: SECRET.to_string(),
            api_base: "http://127.0.0.1:9".to_string(),
            currency: "usd".to_string(),
            webhook_tolerance: Duration::from_secs(300),
        }));
        create_test_state_with(pool, create_test_config(), Some(Arc::from(provider)))
    }

    fn signature(body: &str) -> (HeaderName, HeaderValue) {
        let signed = sign_payload(Utc::now().timestamp(), body.as_bytes(), SECRET).unwrap();
        (HeaderName::from_static(SIGNATURE_HEADER), HeaderValue::from_str(&signed).unwrap())
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_completed_checkout_creates_one_booking(pool: SqlitePool) {
        let tour = create_test_tour(&pool, "The Forest Hiker").await;
        let user = create_test_user(&pool, Role::User).await;
        let server = create_test_app_with(stripe_state(pool.clone()));

        let body = json!({
            "type": "checkout.session.completed",
            "data": {"object": {
                "id": "cs_test_42",
                "client_reference_id": tour.id.to_string(),
                "customer_email": user.email,
                "amount_total": 39700,
            }},
        })
        .to_string();

        for _ in 0..2 {
            let (name, value) = signature(&body);
            let response = server.post("/webhook-checkout").add_header(name, value).text(body.clone()).await;
            response.assert_status_ok();
            assert_eq!(response.json::<Value>(), json!({ "received": true }));
        }

        let mut conn = pool.acquire().await.unwrap();
        let bookings = Bookings::new(&mut conn).list_for_user(user.id).await.unwrap();
        assert_eq!(bookings.len(), 1);
        assert_eq!(bookings[0].price, 397.0);
        assert_eq!(bookings[0].checkout_session_id.as_deref(), Some("cs_test_42"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_bad_signature_is_rejected(pool: SqlitePool) {
        let tour = create_test_tour(&pool, "The Sea Explorer").await;
        let user = create_test_user(&pool, Role::User).await;
        let server = create_test_app_with(stripe_state(pool.clone()));

        let body = json!({
            "type": "checkout.session.completed",
            "data": {"object": {
                "id": "cs_test_43",
                "client_reference_id": tour.id.to_string(),
                "customer_email": user.email,
                "amount_total": 39700,
            }},
        })
        .to_string();

        let response = server
            .post("/webhook-checkout")
            .add_header(HeaderName::from_static(SIGNATURE_HEADER), HeaderValue::from_static("t=1,v1=deadbeef"))
            .text(body)
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(response.json::<Value>()["message"].as_str().unwrap().starts_with("Webhook error:"));

        let mut conn = pool.acquire().await.unwrap();
        assert!(Bookings::new(&mut conn).list_for_user(user.id).await.unwrap().is_empty());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_other_events_are_acknowledged(pool: SqlitePool) {
        let server = create_test_app_with(stripe_state(pool));
        let body = json!({ "type": "payment_intent.created", "data": {"object": {}} }).to_string();
        let (name, value) = signature(&body);
        let response = server.post("/webhook-checkout").add_header(name, value).text(body).await;
        response.assert_status_ok();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_authentic_checkout_is_acknowledged_when_booking_fails(pool: SqlitePool) {
        let tour = create_test_tour(&pool, "The Snow Adventurer").await;
        let user = create_test_user(&pool, Role::User).await;
        let server = create_test_app_with(stripe_state(pool.clone()));

        for (session_id, tour_id, email) in [
            ("cs_test_44", tour.id.to_string(), "gone@example.com".to_string()),
            ("cs_test_45", uuid::Uuid::new_v4().to_string(), user.email.clone()),
        ] {
            let body = json!({
                "type": "checkout.session.completed",
                "data": {"object": {
                    "id": session_id,
                    "client_reference_id": tour_id,
                    "customer_email": email,
                    "amount_total": 99700,
                }},
            })
            .to_string();

            let (name, value) = signature(&body);
            let response = server.post("/webhook-checkout").add_header(name, value).text(body).await;
            response.assert_status_ok();
            assert_eq!(response.json::<Value>(), json!({ "received": true }));
        }

        let mut conn = pool.acquire().await.unwrap();
        assert!(Bookings::new(&mut conn).list_for_user(user.id).await.unwrap().is_empty());
    }
}
