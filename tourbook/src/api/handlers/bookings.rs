use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Serialize;

use crate::{
    AppState,
    api::{
        handlers::factory::{self, Document, DocumentList},
        models::{
            bookings::{BookingCreate, BookingResponse, BookingUpdate, CheckoutSessionResponse},
            pagination::ListQuery,
            users::{CurrentUser, Role},
        },
    },
    auth::guard::restrict_to,
    db::handlers::{Bookings, ListFilter, Repository, Tours, bookings::BOOKING_SCHEMA},
    errors::{Error, Result},
    payment_providers::{CheckoutRequest, record_checkout},
    types::{BookingId, TourId},
};

/// Convert a tour price to the smallest currency unit.
fn price_in_cents(price: f64) -> Result<i64> {
    let cents = (price * 100.0).round();
    if !cents.is_finite() || cents < 0.0 || cents >= i64::MAX as f64 {
        return Err(Error::Internal {
            operation: format!("convert tour price {price} to cents"),
        });
    }
    Ok(cents as i64)
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub status: &'static str,
    pub session: CheckoutSessionResponse,
}

/// Start a checkout for one tour
#[utoipa::path(
    get,
    path = "/bookings/checkout-session/{tourId}",
    tag = "bookings",
    params(("tourId" = uuid::Uuid, Path, description = "Tour to book")),
    responses(
        (status = 200, description = "Checkout session to redirect to", body = CheckoutSessionResponse),
        (status = 401, description = "Not logged in"),
        (status = 404, description = "No such tour"),
        (status = 502, description = "Payment provider failed"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_checkout_session(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(tour_id): Path<TourId>,
) -> Result<Json<CheckoutResponse>> {
    let provider = state.payments.as_ref().ok_or_else(|| Error::Internal {
        operation: "create checkout session: no payment provider configured".to_string(),
    })?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let tour = Tours::new(&mut conn)
        .get_by_id(tour_id)
        .await?
        .ok_or_else(|| Error::not_found("tour", tour_id))?;

    let base_url = state.config.base_url.trim_end_matches('/');
    let request = CheckoutRequest {
        tour_id: tour.id,
        name: format!("{} Tour", tour.name),
        description: tour.summary,
        images: vec![format!("{base_url}/public/img/tours/{}", tour.image_cover)],
        amount: price_in_cents(tour.price)?,
        customer_email: current_user.email.clone(),
        success_url: format!("{base_url}/my-tours"),
        cancel_url: format!("{base_url}/tour/{}", tour.slug),
    };

    let session = provider.create_checkout_session(&request).await?;
    tracing::info!(session_id = %session.id, tour_id = %tour.id, "Created checkout session");

    // Providers that settle immediately never send a webhook
    if let Some(completed) = &session.completed {
        record_checkout(&mut conn, completed).await?;
    }

    Ok(Json(CheckoutResponse {
        status: "success",
        session: CheckoutSessionResponse {
            id: session.id,
            url: session.url,
        },
    }))
}

/// List bookings (admin, lead-guide)
#[utoipa::path(
    get,
    path = "/bookings",
    tag = "bookings",
    params(ListQuery),
    responses(
        (status = 200, description = "A page of bookings", body = Vec<BookingResponse>),
        (status = 403, description = "Insufficient role"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_bookings(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<DocumentList> {
    restrict_to(&current_user, &[Role::Admin, Role::LeadGuide])?;
    let filter = ListFilter::from_query(&BOOKING_SCHEMA, &params)?;
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    factory::get_all::<_, BookingResponse>(&mut Bookings::new(&mut conn), &filter).await
}

/// Get a booking (admin, lead-guide)
#[utoipa::path(
    get,
    path = "/bookings/{id}",
    tag = "bookings",
    params(("id" = uuid::Uuid, Path, description = "Booking ID")),
    responses(
        (status = 200, description = "The booking", body = BookingResponse),
        (status = 404, description = "No such booking"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_booking(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<BookingId>,
) -> Result<Document<BookingResponse>> {
    restrict_to(&current_user, &[Role::Admin, Role::LeadGuide])?;
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    factory::get_one(&mut Bookings::new(&mut conn), id, "booking").await
}

/// Record a booking by hand (admin, lead-guide)
#[utoipa::path(
    post,
    path = "/bookings",
    tag = "bookings",
    request_body = BookingCreate,
    responses(
        (status = 201, description = "Created booking", body = BookingResponse),
        (status = 400, description = "Invalid input or unknown tour/user"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_booking(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(payload): Json<BookingCreate>,
) -> Result<Document<BookingResponse>> {
    restrict_to(&current_user, &[Role::Admin, Role::LeadGuide])?;
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    factory::create_one(&mut Bookings::new(&mut conn), payload).await
}

/// Update a booking (admin, lead-guide)
#[utoipa::path(
    patch,
    path = "/bookings/{id}",
    tag = "bookings",
    request_body = BookingUpdate,
    params(("id" = uuid::Uuid, Path, description = "Booking ID")),
    responses(
        (status = 200, description = "Updated booking", body = BookingResponse),
        (status = 404, description = "No such booking"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_booking(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<BookingId>,
    Json(payload): Json<BookingUpdate>,
) -> Result<Document<BookingResponse>> {
    restrict_to(&current_user, &[Role::Admin, Role::LeadGuide])?;
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    factory::update_one(&mut Bookings::new(&mut conn), id, payload, "booking").await
}

/// Delete a booking (admin, lead-guide)
#[utoipa::path(
    delete,
    path = "/bookings/{id}",
    tag = "bookings",
    params(("id" = uuid::Uuid, Path, description = "Booking ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "No such booking"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn delete_booking(State(state): State<AppState>, current_user: CurrentUser, Path(id): Path<BookingId>) -> Result<StatusCode> {
    restrict_to(&current_user, &[Role::Admin, Role::LeadGuide])?;
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    factory::delete_one(&mut Bookings::new(&mut conn), id, "booking").await
}
