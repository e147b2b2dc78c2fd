//! Database models for reviews.

use crate::types::{ReviewId, TourId, UserId};
use chrono::{DateTime, Utc};

/// Database request for creating a new review
#[derive(Debug, Clone)]
pub struct ReviewCreateDBRequest {
    pub review: String,
    pub rating: f64,
    pub tour_id: TourId,
    pub user_id: UserId,
}

/// Database request for updating a review
#[derive(Debug, Clone, Default)]
pub struct ReviewUpdateDBRequest {
    pub review: Option<String>,
    pub rating: Option<f64>,
    pub tour_id: Option<TourId>,
}

/// Database response for a review, with the author's name and photo joined in
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReviewDBResponse {
    pub id: ReviewId,
    pub review: String,
    pub rating: f64,
    pub tour_id: TourId,
    pub user_id: UserId,
    pub user_name: String,
    pub user_photo: String,
    pub created_at: DateTime<Utc>,
}

/// Aggregate rating of a tour after recomputation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TourRatingDBResponse {
    pub ratings_quantity: i64,
    pub ratings_average: f64,
}
