//! Payment provider abstraction layer
//!
//! This module defines the `PaymentProvider` trait which abstracts checkout session creation
//! and webhook validation across payment providers. Recording the booking for a completed
//! checkout is provider independent and lives in [`record_checkout`].

use async_trait::async_trait;
use axum::http::HeaderMap;
use sqlx::SqliteConnection;
use tracing::instrument;

use crate::{
    config::PaymentConfig,
    db::{
        errors::DbError,
        handlers::{Bookings, Users},
        models::bookings::{BookingCreateDBRequest, BookingDBResponse},
    },
    errors::Error,
    types::TourId,
};

pub mod dummy;
pub mod signing;
pub mod stripe;

/// Create a payment provider from configuration
///
/// This is the single point where we convert config into provider instances.
/// Adding a new provider requires adding a match arm here.
pub fn create_provider(config: PaymentConfig) -> Box<dyn PaymentProvider> {
    match config {
        PaymentConfig::Stripe(stripe_config) => Box::new(stripe::StripeProvider::from(stripe_config)),
        PaymentConfig::Dummy(dummy_config) => Box::new(dummy::DummyProvider::from(dummy_config)),
    }
}

/// Result type for payment provider operations
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Errors that can occur during payment processing
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Payment provider API error: {0}")]
    ProviderApi(String),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("{0}")]
    InvalidSignature(#[from] signing::SignatureError),

    #[error("Invalid payment data: {0}")]
    InvalidData(String),
}

impl From<PaymentError> for Error {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::ProviderApi(message) => Error::Upstream { message },
            PaymentError::InvalidSignature(_) | PaymentError::InvalidData(_) => Error::BadRequest {
                message: format!("Webhook error: {err}"),
            },
            PaymentError::Database(DbError::ForeignKeyViolation { .. }) => Error::BadRequest {
                message: "Webhook error: checkout refers to an unknown tour".to_string(),
            },
            PaymentError::Database(db) => Error::Database(db),
        }
    }
}

/// What the customer is about to pay for
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub tour_id: TourId,
    /// Line item name, e.g. "The Forest Hiker Tour"
    pub name: String,
    pub description: String,
    /// Absolute URLs of product images
    pub images: Vec<String>,
    /// Price in the smallest currency unit
    pub amount: i64,
    pub customer_email: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// A completed checkout, as reported by the provider
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedCheckout {
    pub session_id: String,
    pub tour_id: TourId,
    pub customer_email: String,
    /// Amount paid in the smallest currency unit. Sessions carry one line item with quantity 1,
    /// so this equals the line item's unit amount.
    pub amount_total: i64,
}

/// A checkout session the customer is redirected to
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
    /// Set when the provider settles the payment immediately, without a webhook
    pub completed: Option<CompletedCheckout>,
}

/// A validated webhook event
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookEvent {
    CheckoutCompleted(CompletedCheckout),
    /// Any other event type; acknowledged and ignored
    Other(String),
}

/// Abstract payment provider interface
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create a new checkout session for a single tour
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession>;

    /// Validate and decode a webhook from the raw request data
    ///
    /// Returns Err if validation fails (invalid signature, malformed data, etc.)
    fn validate_webhook(&self, headers: &HeaderMap, body: &[u8], now: i64) -> Result<WebhookEvent>;
}

/// Record the booking for a completed checkout.
///
/// Idempotent: a checkout session that was already recorded returns the original booking.
#[instrument(skip(conn, checkout), fields(session_id = %checkout.session_id), err)]
pub async fn record_checkout(conn: &mut SqliteConnection, checkout: &CompletedCheckout) -> Result<BookingDBResponse> {
    let user = Users::new(&mut *conn)
        .get_user_by_email(&checkout.customer_email)
        .await?
        .ok_or_else(|| PaymentError::InvalidData(format!("no user with email {}", checkout.customer_email)))?;

    let request = BookingCreateDBRequest {
        tour_id: checkout.tour_id,
        user_id: user.id,
        price: checkout.amount_total as f64 / 100.0,
        paid: true,
        checkout_session_id: Some(checkout.session_id.clone()),
    };
    let (booking, created) = Bookings::new(&mut *conn).create_from_checkout(&request).await?;
    if created {
        tracing::info!(booking_id = %booking.id, "Recorded booking for completed checkout");
    } else {
        tracing::debug!(booking_id = %booking.id, "Checkout session already recorded");
    }
    Ok(booking)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::users::Role;
    use crate::db::handlers::{Repository, Tours};
    use crate::test_utils::{create_test_user, tour_request};
    use sqlx::SqlitePool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_record_checkout(pool: SqlitePool) {
        let user = create_test_user(&pool, Role::User).await;
        let mut conn = pool.acquire().await.unwrap();
        let tour = Tours::new(&mut conn).create(&tour_request("The Forest Hiker")).await.unwrap();

        let checkout = CompletedCheckout {
            session_id: "cs_test_abc".to_string(),
            tour_id: tour.id,
            customer_email: user.email.to_uppercase(),
            amount_total: 39700,
        };

        let booking = record_checkout(&mut conn, &checkout).await.unwrap();
        assert_eq!(booking.user_id, user.id);
        assert_eq!(booking.tour_id, tour.id);
        assert_eq!(booking.price, 397.0);
        assert!(booking.paid);

        let replay = record_checkout(&mut conn, &checkout).await.unwrap();
        assert_eq!(replay.id, booking.id);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_record_checkout_unknown_customer(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let tour = Tours::new(&mut conn).create(&tour_request("The Forest Hiker")).await.unwrap();

        let checkout = CompletedCheckout {
            session_id: "cs_test_abc".to_string(),
            tour_id: tour.id,
            customer_email: "nobody@example.com".to_string(),
            amount_total: 39700,
        };

        let err = record_checkout(&mut conn, &checkout).await.unwrap_err();
        assert!(matches!(err, PaymentError::InvalidData(_)));
    }

    #[test]
    fn test_signature_errors_are_bad_requests() {
        let err = Error::from(PaymentError::InvalidSignature(signing::SignatureError::NoMatchingSignature));
        assert_eq!(
            err.user_message(),
            "Webhook error: No signatures found matching the expected signature for payload"
        );
    }
}
