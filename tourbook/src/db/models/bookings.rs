//! Database models for bookings.

use crate::types::{BookingId, TourId, UserId};
use chrono::{DateTime, Utc};

/// Database request for creating a new booking
#[derive(Debug, Clone)]
pub struct BookingCreateDBRequest {
    pub tour_id: TourId,
    pub user_id: UserId,
    pub price: f64,
    pub paid: bool,
    /// Set when the booking comes from a completed checkout
    pub checkout_session_id: Option<String>,
}

/// Database request for updating a booking
#[derive(Debug, Clone, Default)]
pub struct BookingUpdateDBRequest {
    pub price: Option<f64>,
    pub paid: Option<bool>,
}

/// Database response for a booking, with the tour name and the user joined in
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BookingDBResponse {
    pub id: BookingId,
    pub tour_id: TourId,
    pub tour_name: String,
    pub user_id: UserId,
    pub user_name: String,
    pub user_email: String,
    pub price: f64,
    pub paid: bool,
    pub checkout_session_id: Option<String>,
    pub created_at: DateTime<Utc>,
}
