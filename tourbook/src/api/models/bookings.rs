//! API request/response models for bookings.

use super::validation::{Validate, ValidatePatch};
use crate::db::models::bookings::{BookingCreateDBRequest, BookingDBResponse, BookingUpdateDBRequest};
use crate::errors::FieldError;
use crate::types::{BookingId, TourId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Manual booking, as created by staff. Paid bookings normally come from the payment webhook.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct BookingCreate {
    #[schema(value_type = Option<String>, format = "uuid")]
    pub tour: Option<TourId>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub user: Option<UserId>,
    pub price: Option<f64>,
    pub paid: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct BookingUpdate {
    pub price: Option<f64>,
    pub paid: Option<bool>,
}

fn validate_price(price: f64, errors: &mut Vec<FieldError>) {
    if !price.is_finite() || price < 0.0 {
        errors.push(FieldError::new("price", "Booking price must be a positive number"));
    }
}

impl Validate for BookingCreate {
    type Valid = BookingCreateDBRequest;

    fn validate(self) -> Result<BookingCreateDBRequest, Vec<FieldError>> {
        let mut errors = Vec::new();
        if self.tour.is_none() {
            errors.push(FieldError::new("tour", "Booking must belong to a Tour!"));
        }
        if self.user.is_none() {
            errors.push(FieldError::new("user", "Booking must belong to a User!"));
        }
        match self.price {
            Some(price) => validate_price(price, &mut errors),
            None => errors.push(FieldError::new("price", "Booking must have a price.")),
        }

        match (self.tour, self.user, self.price) {
            (Some(tour_id), Some(user_id), Some(price)) if errors.is_empty() => Ok(BookingCreateDBRequest {
                tour_id,
                user_id,
                price,
                paid: self.paid.unwrap_or(true),
                checkout_session_id: None,
            }),
            _ => Err(errors),
        }
    }
}

impl ValidatePatch<BookingDBResponse> for BookingUpdate {
    type Valid = BookingUpdateDBRequest;

    fn validate_patch(self, _current: &BookingDBResponse) -> Result<BookingUpdateDBRequest, Vec<FieldError>> {
        let mut errors = Vec::new();
        if let Some(price) = self.price {
            validate_price(price, &mut errors);
        }
        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(BookingUpdateDBRequest {
            price: self.price,
            paid: self.paid,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookingTour {
    #[schema(value_type = String, format = "uuid")]
    pub id: TourId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookingUser {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookingResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: BookingId,
    pub tour: BookingTour,
    pub user: BookingUser,
    pub price: f64,
    pub paid: bool,
    pub created_at: DateTime<Utc>,
}

impl From<BookingDBResponse> for BookingResponse {
    fn from(db: BookingDBResponse) -> Self {
        Self {
            id: db.id,
            tour: BookingTour {
                id: db.tour_id,
                name: db.tour_name,
            },
            user: BookingUser {
                id: db.user_id,
                name: db.user_name,
                email: db.user_email,
            },
            price: db.price,
            paid: db.paid,
            created_at: db.created_at,
        }
    }
}

/// A checkout session the client is redirected to
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CheckoutSessionResponse {
    pub id: String,
    pub url: String,
}
