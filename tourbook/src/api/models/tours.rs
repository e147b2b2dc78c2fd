//! API request/response models for tours.

use super::reviews::ReviewResponse;
use super::users::Role;
use super::validation::{Validate, ValidatePatch};
use crate::db::models::tours::{GuideDBResponse, TourCreateDBRequest, TourDBResponse, TourUpdateDBRequest};
use crate::errors::FieldError;
use crate::types::{TourId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Difficult,
}

impl Difficulty {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "easy" => Some(Self::Easy),
            "medium" => Some(Self::Medium),
            "difficult" => Some(Self::Difficult),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Difficult => "difficult",
        }
    }
}

/// A point on the map with a human readable address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A stop on the tour itinerary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TourLocation {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub day: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TourCreate {
    pub name: Option<String>,
    pub duration: Option<i64>,
    pub max_group_size: Option<i64>,
    pub difficulty: Option<String>,
    pub ratings_average: Option<f64>,
    pub ratings_quantity: Option<i64>,
    pub price: Option<f64>,
    pub price_discount: Option<f64>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub image_cover: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub start_dates: Vec<DateTime<Utc>>,
    #[serde(default)]
    pub secret_tour: bool,
    pub start_location: Option<GeoPoint>,
    #[serde(default)]
    pub locations: Vec<TourLocation>,
    #[serde(default)]
    #[schema(value_type = Vec<String>)]
    pub guides: Vec<UserId>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TourUpdate {
    pub name: Option<String>,
    pub duration: Option<i64>,
    pub max_group_size: Option<i64>,
    pub difficulty: Option<String>,
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
    #[schema(value_type = Option<Vec<String>>)]
    pub guides: Option<Vec<UserId>>,
}

fn validate_name(name: &str, errors: &mut Vec<FieldError>) {
    let name = name.trim();
    let length = name.chars().count();
    if length > 40 {
        errors.push(FieldError::new("name", "A tour name must have less or equal then 40 characters"));
    }
    if length < 10 {
        errors.push(FieldError::new("name", "A tour name must have more or equal then 10 characters"));
    }
    if !name.chars().filter(|c| *c != ' ').all(char::is_alphabetic) {
        errors.push(FieldError::new("name", "Tour name must only contain letters"));
    }
}

fn validate_difficulty(difficulty: &str, errors: &mut Vec<FieldError>) {
    if Difficulty::parse(difficulty).is_none() {
        errors.push(FieldError::new("difficulty", "Difficulty is either: easy, medium, difficult"));
    }
}

fn validate_rating(rating: f64, errors: &mut Vec<FieldError>) {
    if rating < 1.0 {
        errors.push(FieldError::new("ratingsAverage", "Rating must be above 1.0"));
    } else if rating > 5.0 {
        errors.push(FieldError::new("ratingsAverage", "Rating must be below 5.0"));
    }
}

fn validate_positive(field: &str, value: i64, message: &str, errors: &mut Vec<FieldError>) {
    if value <= 0 {
        errors.push(FieldError::new(field, message));
    }
}

fn validate_discount(discount: f64, price: f64, errors: &mut Vec<FieldError>) {
    if discount >= price {
        errors.push(FieldError::new(
            "priceDiscount",
            format!("Discount price ({discount}) should be below regular price"),
        ));
    }
}

fn validate_not_blank(field: &str, value: &str, message: &str, errors: &mut Vec<FieldError>) {
    if value.trim().is_empty() {
        errors.push(FieldError::new(field, message));
    }
}

impl TourCreate {
    fn field_errors(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();

        match &self.name {
            Some(name) => validate_name(name, &mut errors),
            None => errors.push(FieldError::new("name", "A tour must have name")),
        }
        match self.duration {
            Some(d) => validate_positive("duration", d, "Duration must be a positive number of days", &mut errors),
            None => errors.push(FieldError::new("duration", "A tour must have duration")),
        }
        match self.max_group_size {
            Some(g) => validate_positive("maxGroupSize", g, "Group size must be positive", &mut errors),
            None => errors.push(FieldError::new("maxGroupSize", "A tour must have group size")),
        }
        match &self.difficulty {
            Some(d) => validate_difficulty(d, &mut errors),
            None => errors.push(FieldError::new("difficulty", "A tour must have a difficulty")),
        }
        if let Some(rating) = self.ratings_average {
            validate_rating(rating, &mut errors);
        }
        match self.price {
            Some(price) if price < 0.0 => errors.push(FieldError::new("price", "Price cannot be negative")),
            Some(price) => {
                if let Some(discount) = self.price_discount {
                    validate_discount(discount, price, &mut errors);
                }
            }
            None => errors.push(FieldError::new("price", "A tour must have price")),
        }
        match &self.summary {
            Some(s) => validate_not_blank("summary", s, "A tour must have a summary", &mut errors),
            None => errors.push(FieldError::new("summary", "A tour must have a summary")),
        }
        match &self.image_cover {
            Some(c) => validate_not_blank("imageCover", c, "A tour must have a cover image", &mut errors),
            None => errors.push(FieldError::new("imageCover", "A tour must have a cover image")),
        }

        errors
    }
}

impl Validate for TourCreate {
    type Valid = TourCreateDBRequest;

    fn validate(self) -> Result<TourCreateDBRequest, Vec<FieldError>> {
        let errors = self.field_errors();
        if !errors.is_empty() {
            return Err(errors);
        }
        TourCreateDBRequest::from_validated(self).ok_or_else(|| vec![FieldError::new("tour", "Invalid tour data")])
    }
}

impl ValidatePatch<TourDBResponse> for TourUpdate {
    type Valid = TourUpdateDBRequest;

    fn validate_patch(self, current: &TourDBResponse) -> Result<TourUpdateDBRequest, Vec<FieldError>> {
        let mut errors = Vec::new();

        if let Some(name) = &self.name {
            validate_name(name, &mut errors);
        }
        if let Some(d) = self.duration {
            validate_positive("duration", d, "Duration must be a positive number of days", &mut errors);
        }
        if let Some(g) = self.max_group_size {
            validate_positive("maxGroupSize", g, "Group size must be positive", &mut errors);
        }
        if let Some(d) = &self.difficulty {
            validate_difficulty(d, &mut errors);
        }
        if let Some(rating) = self.ratings_average {
            validate_rating(rating, &mut errors);
        }
        if let Some(s) = &self.summary {
            validate_not_blank("summary", s, "A tour must have a summary", &mut errors);
        }
        if let Some(c) = &self.image_cover {
            validate_not_blank("imageCover", c, "A tour must have a cover image", &mut errors);
        }

        let price = self.price.unwrap_or(current.price);
        if price < 0.0 {
            errors.push(FieldError::new("price", "Price cannot be negative"));
        }
        // The discount rule is checked against the merged entity
        if let Some(discount) = self.price_discount.or(current.price_discount) {
            validate_discount(discount, price, &mut errors);
        }

        if errors.is_empty() { Ok(self.into()) } else { Err(errors) }
    }
}

/// A guide as embedded in tour responses.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GuideResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub photo: String,
    pub role: Role,
}

impl From<GuideDBResponse> for GuideResponse {
    fn from(db: GuideDBResponse) -> Self {
        Self {
            id: db.id,
            name: db.name,
            email: db.email,
            photo: db.photo,
            role: db.role,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TourResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: TourId,
    pub name: String,
    pub slug: String,
    pub duration: i64,
    pub duration_weeks: f64,
    pub max_group_size: i64,
    pub difficulty: Difficulty,
    pub ratings_average: f64,
    pub ratings_quantity: i64,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_discount: Option<f64>,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub image_cover: String,
    pub images: Vec<String>,
    pub start_dates: Vec<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_location: Option<GeoPoint>,
    pub locations: Vec<TourLocation>,
    pub guides: Vec<GuideResponse>,
    /// Only present on single-tour reads
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviews: Option<Vec<ReviewResponse>>,
    pub created_at: DateTime<Utc>,
}

impl From<TourDBResponse> for TourResponse {
    fn from(db: TourDBResponse) -> Self {
        Self {
            id: db.id,
            duration_weeks: db.duration as f64 / 7.0,
            name: db.name,
            slug: db.slug,
            duration: db.duration,
            max_group_size: db.max_group_size,
            difficulty: db.difficulty,
            ratings_average: db.ratings_average,
            ratings_quantity: db.ratings_quantity,
            price: db.price,
            price_discount: db.price_discount,
            summary: db.summary,
            description: db.description,
            image_cover: db.image_cover,
            images: db.images,
            start_dates: db.start_dates,
            start_location: db.start_location,
            locations: db.locations,
            guides: db.guides.into_iter().map(Into::into).collect(),
            reviews: None,
            created_at: db.created_at,
        }
    }
}

impl TourResponse {
    /// Attach the tour's reviews (single-tour reads only)
    pub fn with_reviews(mut self, reviews: Vec<ReviewResponse>) -> Self {
        self.reviews = Some(reviews);
        self
    }
}

/// Per-difficulty aggregate over highly rated tours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TourStats {
    /// Upper-cased difficulty
    pub id: String,
    pub num_tours: i64,
    pub num_ratings: i64,
    pub avg_rating: f64,
    pub avg_price: f64,
    pub min_price: f64,
    pub max_price: f64,
}

/// Tour starts in one month of a year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyPlan {
    pub month: u32,
    pub num_tour_starts: i64,
    pub tours: Vec<String>,
}

/// Distance from a given centre to a tour's start location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TourDistance {
    #[schema(value_type = String, format = "uuid")]
    pub id: TourId,
    pub name: String,
    pub distance: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_create() -> TourCreate {
        TourCreate {
            name: Some("The Forest Hiker".to_string()),
            duration: Some(5),
            max_group_size: Some(25),
            difficulty: Some("easy".to_string()),
            price: Some(397.0),
            summary: Some("Breathtaking hike through the Canadian Banff National Park".to_string()),
            image_cover: Some("tour-1-cover.jpg".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_tour_passes() {
        let request = valid_create().validate().unwrap();
        assert_eq!(request.name, "The Forest Hiker");
        assert_eq!(request.difficulty, Difficulty::Easy);
    }

    #[test]
    fn test_missing_required_fields() {
        let errors = TourCreate::default().validate().unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["name", "duration", "maxGroupSize", "difficulty", "price", "summary", "imageCover"]
        );
        assert_eq!(errors[0].message, "A tour must have name");
    }

    #[test]
    fn test_name_rules() {
        let mut tour = valid_create();
        tour.name = Some("Short".to_string());
        assert_eq!(tour.field_errors()[0].message, "A tour name must have more or equal then 10 characters");

        tour.name = Some("The Forest Hiker 2".to_string());
        assert_eq!(tour.field_errors()[0].message, "Tour name must only contain letters");

        tour.name = Some("A".repeat(41));
        assert_eq!(tour.field_errors()[0].message, "A tour name must have less or equal then 40 characters");
    }

    #[test]
    fn test_discount_must_be_below_price() {
        let mut tour = valid_create();
        tour.price_discount = Some(500.0);
        let errors = tour.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "priceDiscount");
        assert_eq!(errors[0].message, "Discount price (500) should be below regular price");
    }

    #[test]
    fn test_bad_difficulty_and_rating() {
        let mut tour = valid_create();
        tour.difficulty = Some("extreme".to_string());
        tour.ratings_average = Some(6.0);
        let messages: Vec<String> = tour.validate().unwrap_err().into_iter().map(|e| e.message).collect();
        assert_eq!(
            messages,
            vec!["Difficulty is either: easy, medium, difficult", "Rating must be below 5.0"]
        );
    }
}
