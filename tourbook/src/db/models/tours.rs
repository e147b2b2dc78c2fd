//! Database models for tours.

use crate::api::models::tours::{Difficulty, GeoPoint, TourCreate, TourLocation, TourUpdate};
use crate::api::models::users::Role;
use crate::types::{TourId, UserId};
use chrono::{DateTime, Utc};

/// Database request for creating a new tour. The slug is derived from the name.
#[derive(Debug, Clone)]
pub struct TourCreateDBRequest {
    pub name: String,
    pub duration: i64,
    pub max_group_size: i64,
    pub difficulty: Difficulty,
    pub ratings_average: Option<f64>,
    pub ratings_quantity: Option<i64>,
    pub price: f64,
    pub price_discount: Option<f64>,
    pub summary: String,
    pub description: Option<String>,
    pub image_cover: String,
    pub images: Vec<String>,
    pub start_dates: Vec<DateTime<Utc>>,
    pub secret_tour: bool,
    pub start_location: Option<GeoPoint>,
    pub locations: Vec<TourLocation>,
    pub guides: Vec<UserId>,
}

impl TourCreateDBRequest {
    /// Convert an already validated API payload.
    pub fn from_validated(api: TourCreate) -> Option<Self> {
        Some(Self {
            name: api.name?.trim().to_string(),
            duration: api.duration?,
            max_group_size: api.max_group_size?,
            difficulty: Difficulty::parse(&api.difficulty?)?,
            ratings_average: api.ratings_average,
            ratings_quantity: api.ratings_quantity,
            price: api.price?,
            price_discount: api.price_discount,
            summary: api.summary?.trim().to_string(),
            description: api.description.map(|d| d.trim().to_string()),
            image_cover: api.image_cover?,
            images: api.images,
            start_dates: api.start_dates,
            secret_tour: api.secret_tour,
            start_location: api.start_location,
            locations: api.locations,
            guides: api.guides,
        })
    }
}

/// Database request for updating a tour. `None` leaves a column untouched.
#[derive(Debug, Clone, Default)]
pub struct TourUpdateDBRequest {
    pub name: Option<String>,
    pub duration: Option<i64>,
    pub max_group_size: Option<i64>,
    pub difficulty: Option<Difficulty>,
    pub ratings_average: Option<f64>,
    pub ratings_quantity: Option<i64>,
    pub price: Option<f64>,
    pub price_discount: Option<f64>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub image_cover: Option<String>,
    pub images: Option<Vec<String>>,
    pub start_dates: Option<Vec<DateTime<Utc>>>,
    pub secret_tour: Option<bool>,
    pub start_location: Option<GeoPoint>,
    pub locations: Option<Vec<TourLocation>>,
    pub guides: Option<Vec<UserId>>,
}

impl From<TourUpdate> for TourUpdateDBRequest {
    fn from(api: TourUpdate) -> Self {
        Self {
            name: api.name.map(|n| n.trim().to_string()),
            duration: api.duration,
            max_group_size: api.max_group_size,
            difficulty: api.difficulty.as_deref().and_then(Difficulty::parse),
            ratings_average: api.ratings_average,
            ratings_quantity: api.ratings_quantity,
            price: api.price,
            price_discount: api.price_discount,
            summary: api.summary.map(|s| s.trim().to_string()),
            description: api.description,
            image_cover: api.image_cover,
            images: api.images,
            start_dates: api.start_dates,
            secret_tour: api.secret_tour,
            start_location: api.start_location,
            locations: api.locations,
            guides: api.guides,
        }
    }
}

/// A guide joined onto a tour
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GuideDBResponse {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub photo: String,
    pub role: Role,
}

/// Database response for a tour, with its guides eagerly loaded
#[derive(Debug, Clone)]
pub struct TourDBResponse {
    pub id: TourId,
    pub name: String,
    pub slug: String,
    pub duration: i64,
    pub max_group_size: i64,
    pub difficulty: Difficulty,
    pub ratings_average: f64,
    pub ratings_quantity: i64,
    pub price: f64,
    pub price_discount: Option<f64>,
    pub summary: String,
    pub description: Option<String>,
    pub image_cover: String,
    pub images: Vec<String>,
    pub start_dates: Vec<DateTime<Utc>>,
    pub secret_tour: bool,
    pub start_location: Option<GeoPoint>,
    pub locations: Vec<TourLocation>,
    pub guides: Vec<GuideDBResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
