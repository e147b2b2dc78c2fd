use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use sqlx::SqliteConnection;

use crate::{
    AppState,
    api::{
        handlers::factory::{self, Document, DocumentList},
        models::{
            pagination::ListQuery,
            reviews::{ReviewCreate, ReviewResponse, ReviewUpdate},
            users::{CurrentUser, Role},
        },
    },
    auth::guard::restrict_to,
    db::{
        handlers::{
            ListFilter, Repository, Reviews,
            listing::FilterValue,
            reviews::REVIEW_SCHEMA,
        },
        models::reviews::ReviewDBResponse,
    },
    errors::{Error, Result},
    types::{ReviewId, TourId},
};

/// Load a review the caller is about to change. Only admins may touch other people's reviews.
async fn owned_review(conn: &mut SqliteConnection, current_user: &CurrentUser, id: ReviewId) -> Result<ReviewDBResponse> {
    restrict_to(current_user, &[Role::User, Role::Admin])?;

    let review = Reviews::new(conn).get_by_id(id).await?.ok_or_else(|| Error::not_found("review", id))?;
    if current_user.role != Role::Admin && review.user_id != current_user.id {
        return Err(Error::Forbidden {
            message: "You cannot edit or delete someone else's review.".to_string(),
        });
    }
    Ok(review)
}

async fn list(state: &AppState, params: &[(String, String)], tour_id: Option<TourId>) -> Result<DocumentList> {
    let mut filter = ListFilter::from_query(&REVIEW_SCHEMA, params)?;
    if let Some(tour_id) = tour_id {
        filter = filter.with_prefilter("reviews.tour_id", FilterValue::Id(tour_id));
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    factory::get_all::<_, ReviewResponse>(&mut Reviews::new(&mut conn), &filter).await
}

async fn create(state: &AppState, current_user: &CurrentUser, mut payload: ReviewCreate, tour_id: Option<TourId>) -> Result<Document<ReviewResponse>> {
    restrict_to(current_user, &[Role::User])?;
    if tour_id.is_some() {
        payload.tour = tour_id;
    }
    payload.user = Some(current_user.id);

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let created = factory::create_one::<_, _, ReviewResponse>(&mut Reviews::new(&mut conn), payload).await?;
    Reviews::new(&mut conn).recalculate_ratings(created.data.tour).await?;
    Ok(created)
}

/// List reviews
#[utoipa::path(
    get,
    path = "/reviews",
    tag = "reviews",
    params(ListQuery),
    responses(
        (status = 200, description = "A page of reviews", body = Vec<ReviewResponse>),
        (status = 401, description = "Not logged in"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_reviews(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<DocumentList> {
    list(&state, &params, None).await
}

/// List the reviews of one tour
#[utoipa::path(
    get,
    path = "/tours/{id}/reviews",
    tag = "reviews",
    params(("id" = uuid::Uuid, Path, description = "Tour ID"), ListQuery),
    responses(
        (status = 200, description = "A page of the tour's reviews", body = Vec<ReviewResponse>),
        (status = 401, description = "Not logged in"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_tour_reviews(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(tour_id): Path<TourId>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<DocumentList> {
    list(&state, &params, Some(tour_id)).await
}

/// Get a review
#[utoipa::path(
    get,
    path = "/reviews/{id}",
    tag = "reviews",
    params(("id" = uuid::Uuid, Path, description = "Review ID")),
    responses(
        (status = 200, description = "The review", body = ReviewResponse),
        (status = 404, description = "No such review"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_review(State(state): State<AppState>, _current_user: CurrentUser, Path(id): Path<ReviewId>) -> Result<Document<ReviewResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    factory::get_one(&mut Reviews::new(&mut conn), id, "review").await
}

/// Review a tour (users only)
#[utoipa::path(
    post,
    path = "/reviews",
    tag = "reviews",
    request_body = ReviewCreate,
    responses(
        (status = 201, description = "Created review", body = ReviewResponse),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Only users may review"),
        (status = 409, description = "Tour already reviewed by this user"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_review(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(payload): Json<ReviewCreate>,
) -> Result<Document<ReviewResponse>> {
    create(&state, &current_user, payload, None).await
}

/// Review the tour in the path (users only)
#[utoipa::path(
    post,
    path = "/tours/{id}/reviews",
    tag = "reviews",
    request_body = ReviewCreate,
    params(("id" = uuid::Uuid, Path, description = "Tour ID")),
    responses(
        (status = 201, description = "Created review", body = ReviewResponse),
        (status = 400, description = "Invalid input or unknown tour"),
        (status = 403, description = "Only users may review"),
        (status = 409, description = "Tour already reviewed by this user"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_tour_review(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(tour_id): Path<TourId>,
    Json(payload): Json<ReviewCreate>,
) -> Result<Document<ReviewResponse>> {
    create(&state, &current_user, payload, Some(tour_id)).await
}

/// Edit a review (its author, or an admin)
#[utoipa::path(
    patch,
    path = "/reviews/{id}",
    tag = "reviews",
    request_body = ReviewUpdate,
    params(("id" = uuid::Uuid, Path, description = "Review ID")),
    responses(
        (status = 200, description = "Updated review", body = ReviewResponse),
        (status = 403, description = "Someone else's review"),
        (status = 404, description = "No such review"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_review(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<ReviewId>,
    Json(payload): Json<ReviewUpdate>,
) -> Result<Document<ReviewResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let before = owned_review(&mut conn, &current_user, id).await?;

    let updated = factory::update_one::<_, _, ReviewResponse>(&mut Reviews::new(&mut conn), id, payload, "review").await?;

    let mut reviews = Reviews::new(&mut conn);
    reviews.recalculate_ratings(updated.data.tour).await?;
    if before.tour_id != updated.data.tour {
        reviews.recalculate_ratings(before.tour_id).await?;
    }
    Ok(updated)
}

/// Delete a review (its author, or an admin)
#[utoipa::path(
    delete,
    path = "/reviews/{id}",
    tag = "reviews",
    params(("id" = uuid::Uuid, Path, description = "Review ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Someone else's review"),
        (status = 404, description = "No such review"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn delete_review(State(state): State<AppState>, current_user: CurrentUser, Path(id): Path<ReviewId>) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let review = owned_review(&mut conn, &current_user, id).await?;

    let mut reviews = Reviews::new(&mut conn);
    let status = factory::delete_one(&mut reviews, id, "review").await?;
    reviews.recalculate_ratings(review.tour_id).await?;
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{auth_header, create_test_app, create_test_config, create_test_tour, create_test_user};
    use serde_json::{Value, json};
    use sqlx::SqlitePool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_reviews_require_login(pool: SqlitePool) {
        let server = create_test_app(pool);
        let response = server.get("/api/v1/reviews").await;
        response.assert_status_unauthorized();
        assert_eq!(
            response.json::<Value>()["message"],
            "You are not logged in! Please log in to get access."
        );
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_review_lifecycle_drives_ratings(pool: SqlitePool) {
        let tour = create_test_tour(&pool, "The Forest Hiker").await;
        let other_tour = create_test_tour(&pool, "The Sea Explorer").await;
        let author = create_test_user(&pool, Role::User).await;
        let config = create_test_config();
        let server = create_test_app(pool);
        let (name, value) = auth_header(author.id, &config);

        let response = server
            .post(&format!("/api/v1/tours/{}/reviews", tour.id))
            .add_header(name.clone(), value.clone())
            .json(&json!({ "review": "Great guides", "rating": 4, "user": uuid::Uuid::new_v4() }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let review: Value = response.json();
        let review_id = review["data"]["data"]["id"].as_str().unwrap().to_string();
        assert_eq!(review["data"]["data"]["user"]["id"], author.id.to_string());

        // Second review of the same tour by the same user
        let response = server
            .post("/api/v1/reviews")
            .add_header(name.clone(), value.clone())
            .json(&json!({ "review": "Again", "rating": 2, "tour": tour.id }))
            .await;
        response.assert_status(StatusCode::CONFLICT);
        assert_eq!(response.json::<Value>()["message"], "You have already reviewed this tour.");

        let body: Value = server.get(&format!("/api/v1/tours/{}", tour.id)).await.json();
        assert_eq!(body["data"]["data"]["ratingsQuantity"], 1);
        assert_eq!(body["data"]["data"]["ratingsAverage"], 4.0);

        // Moving the review recomputes both tours
        server
            .patch(&format!("/api/v1/reviews/{review_id}"))
            .add_header(name.clone(), value.clone())
            .json(&json!({ "tour": other_tour.id, "rating": 5 }))
            .await
            .assert_status_ok();

        let body: Value = server.get(&format!("/api/v1/tours/{}", tour.id)).await.json();
        assert_eq!(body["data"]["data"]["ratingsQuantity"], 0);
        assert_eq!(body["data"]["data"]["ratingsAverage"], 4.5);
        let body: Value = server.get(&format!("/api/v1/tours/{}", other_tour.id)).await.json();
        assert_eq!(body["data"]["data"]["ratingsQuantity"], 1);
        assert_eq!(body["data"]["data"]["ratingsAverage"], 5.0);

        let body: Value = server
            .get(&format!("/api/v1/tours/{}/reviews", other_tour.id))
            .add_header(name.clone(), value.clone())
            .await
            .json();
        assert_eq!(body["results"], 1);

        server
            .delete(&format!("/api/v1/reviews/{review_id}"))
            .add_header(name, value)
            .await
            .assert_status(StatusCode::NO_CONTENT);
        let body: Value = server.get(&format!("/api/v1/tours/{}", other_tour.id)).await.json();
        assert_eq!(body["data"]["data"]["ratingsQuantity"], 0);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_review_ownership_and_roles(pool: SqlitePool) {
        let tour = create_test_tour(&pool, "The Snow Adventurer").await;
        let author = create_test_user(&pool, Role::User).await;
        let stranger = create_test_user(&pool, Role::User).await;
        let guide = create_test_user(&pool, Role::Guide).await;
        let admin = create_test_user(&pool, Role::Admin).await;
        let config = create_test_config();
        let server = create_test_app(pool);

        let (name, value) = auth_header(guide.id, &config);
        server
            .post(&format!("/api/v1/tours/{}/reviews", tour.id))
            .add_header(name, value)
            .json(&json!({ "review": "Staff review", "rating": 5 }))
            .await
            .assert_status_forbidden();

        let (name, value) = auth_header(author.id, &config);
        let review: Value = server
            .post(&format!("/api/v1/tours/{}/reviews", tour.id))
            .add_header(name, value)
            .json(&json!({ "review": "Cold but beautiful", "rating": 4 }))
            .await
            .json();
        let review_id = review["data"]["data"]["id"].as_str().unwrap().to_string();

        let (name, value) = auth_header(stranger.id, &config);
        let response = server
            .patch(&format!("/api/v1/reviews/{review_id}"))
            .add_header(name, value)
            .json(&json!({ "rating": 1 }))
            .await;
        response.assert_status_forbidden();
        assert_eq!(response.json::<Value>()["message"], "You cannot edit or delete someone else's review.");

        let (name, value) = auth_header(admin.id, &config);
        server
            .delete(&format!("/api/v1/reviews/{review_id}"))
            .add_header(name, value)
            .await
            .assert_status(StatusCode::NO_CONTENT);
    }
}
