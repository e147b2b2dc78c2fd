//! API request/response models for reviews.

use super::validation::{Validate, ValidatePatch};
use crate::db::models::reviews::{ReviewCreateDBRequest, ReviewDBResponse, ReviewUpdateDBRequest};
use crate::errors::FieldError;
use crate::types::{ReviewId, TourId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// New review. On nested routes the tour comes from the path; the author is always the caller.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ReviewCreate {
    pub review: Option<String>,
    pub rating: Option<f64>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub tour: Option<TourId>,
    #[serde(skip)]
    pub user: Option<UserId>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ReviewUpdate {
    pub review: Option<String>,
    pub rating: Option<f64>,
    /// Move the review to another tour
    #[schema(value_type = Option<String>, format = "uuid")]
    pub tour: Option<TourId>,
}

fn validate_rating(rating: f64, errors: &mut Vec<FieldError>) {
    if !(1.0..=5.0).contains(&rating) {
        errors.push(FieldError::new("rating", "Rating must be between 1 and 5"));
    }
}

fn validate_text(review: &str, errors: &mut Vec<FieldError>) {
    if review.trim().is_empty() {
        errors.push(FieldError::new("review", "Review can not be empty!"));
    }
}

impl Validate for ReviewCreate {
    type Valid = ReviewCreateDBRequest;

    fn validate(self) -> Result<ReviewCreateDBRequest, Vec<FieldError>> {
        let mut errors = Vec::new();
        match &self.review {
            Some(review) => validate_text(review, &mut errors),
            None => errors.push(FieldError::new("review", "Review can not be empty!")),
        }
        match self.rating {
            Some(rating) => validate_rating(rating, &mut errors),
            None => errors.push(FieldError::new("rating", "Review must have a rating")),
        }
        if self.tour.is_none() {
            errors.push(FieldError::new("tour", "Review must belong to a tour."));
        }
        if self.user.is_none() {
            errors.push(FieldError::new("user", "Review must belong to a user"));
        }

        match (self.review, self.rating, self.tour, self.user) {
            (Some(review), Some(rating), Some(tour_id), Some(user_id)) if errors.is_empty() => Ok(ReviewCreateDBRequest {
                review: review.trim().to_string(),
                rating,
                tour_id,
                user_id,
            }),
            _ => Err(errors),
        }
    }
}

impl ValidatePatch<ReviewDBResponse> for ReviewUpdate {
    type Valid = ReviewUpdateDBRequest;

    fn validate_patch(self, _current: &ReviewDBResponse) -> Result<ReviewUpdateDBRequest, Vec<FieldError>> {
        let mut errors = Vec::new();
        if let Some(review) = &self.review {
            validate_text(review, &mut errors);
        }
        if let Some(rating) = self.rating {
            validate_rating(rating, &mut errors);
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(ReviewUpdateDBRequest {
            review: self.review.map(|r| r.trim().to_string()),
            rating: self.rating,
            tour_id: self.tour,
        })
    }
}

/// The review author, as embedded in review responses.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReviewAuthor {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub name: String,
    pub photo: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: ReviewId,
    pub review: String,
    pub rating: f64,
    #[schema(value_type = String, format = "uuid")]
    pub tour: TourId,
    pub user: ReviewAuthor,
    pub created_at: DateTime<Utc>,
}

impl From<ReviewDBResponse> for ReviewResponse {
    fn from(db: ReviewDBResponse) -> Self {
        Self {
            id: db.id,
            review: db.review,
            rating: db.rating,
            tour: db.tour_id,
            user: ReviewAuthor {
                id: db.user_id,
                name: db.user_name,
                photo: db.user_photo,
            },
            created_at: db.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_review_create_validation() {
        let tour = Uuid::new_v4();
        let user = Uuid::new_v4();

        let request = ReviewCreate {
            review: Some("  Amazing tour!  ".to_string()),
            rating: Some(5.0),
            tour: Some(tour),
            user: Some(user),
        }
        .validate()
        .unwrap();
        assert_eq!(request.review, "Amazing tour!");
        assert_eq!(request.tour_id, tour);
        assert_eq!(request.user_id, user);

        let errors = ReviewCreate::default().validate().unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["review", "rating", "tour", "user"]);
    }

    #[test]
    fn test_rating_bounds() {
        let errors = ReviewCreate {
            review: Some("Too good".to_string()),
            rating: Some(6.0),
            tour: Some(Uuid::new_v4()),
            user: Some(Uuid::new_v4()),
        }
        .validate()
        .unwrap_err();
        assert_eq!(errors, vec![FieldError::new("rating", "Rating must be between 1 and 5")]);
    }

    #[test]
    fn test_user_field_is_not_deserialized() {
        let user = Uuid::new_v4();
        let payload: ReviewCreate = serde_json::from_value(serde_json::json!({
            "review": "Nice",
            "rating": 4,
            "user": user,
        }))
        .unwrap();
        assert!(payload.user.is_none());
    }
}
