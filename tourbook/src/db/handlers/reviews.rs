//! Database repository for reviews.
//!
//! A tour's `ratings_quantity` and `ratings_average` are derived from its reviews; callers that
//! mutate reviews follow up with [`Reviews::recalculate_ratings`] for every tour they touched.

use crate::types::{ReviewId, TourId, abbrev_uuid};
use crate::db::{
    errors::{DbError, Result},
    handlers::{
        listing::{EntitySchema, FieldKind, FieldSpec, ListFilter},
        repository::Repository,
        tours::round_rating,
    },
    models::reviews::{ReviewCreateDBRequest, ReviewDBResponse, ReviewUpdateDBRequest, TourRatingDBResponse},
};
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::instrument;
use uuid::Uuid;

/// Rating a tour shows before anyone has reviewed it
pub const DEFAULT_RATING: f64 = 4.5;

/// Fields the review list may be filtered and sorted on
pub const REVIEW_SCHEMA: EntitySchema = EntitySchema {
    table: "reviews",
    fields: &[
        FieldSpec::new("id", "reviews.id", FieldKind::Id),
        FieldSpec::new("rating", "reviews.rating", FieldKind::Number),
        FieldSpec::new("tour", "reviews.tour_id", FieldKind::Id),
        FieldSpec::new("user", "reviews.user_id", FieldKind::Id),
        FieldSpec::new("createdAt", "reviews.created_at", FieldKind::Timestamp),
    ],
};

const SELECT_REVIEWS: &str = "SELECT reviews.id, reviews.review, reviews.rating, reviews.tour_id, reviews.user_id, \
     users.name AS user_name, users.photo AS user_photo, reviews.created_at \
     FROM reviews JOIN users ON users.id = reviews.user_id WHERE 1 = 1";

pub struct Reviews<'c> {
    db: &'c mut SqliteConnection,
}

async fn fetch_review(conn: &mut SqliteConnection, id: ReviewId) -> Result<Option<ReviewDBResponse>> {
    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_REVIEWS);
    query.push(" AND reviews.id = ").push_bind(id);

    Ok(query.build_query_as::<ReviewDBResponse>().fetch_optional(&mut *conn).await?)
}

#[async_trait::async_trait]
impl<'c> Repository for Reviews<'c> {
    type CreateRequest = ReviewCreateDBRequest;
    type UpdateRequest = ReviewUpdateDBRequest;
    type Response = ReviewDBResponse;
    type Id = ReviewId;
    type Filter = ListFilter;

    #[instrument(skip(self, request), fields(tour_id = %abbrev_uuid(&request.tour_id), user_id = %abbrev_uuid(&request.user_id)), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let review_id = Uuid::new_v4();

        sqlx::query("INSERT INTO reviews (id, review, rating, tour_id, user_id, created_at) VALUES (?, ?, ?, ?, ?, ?)")
            .bind(review_id)
            .bind(&request.review)
            .bind(request.rating)
            .bind(request.tour_id)
            .bind(request.user_id)
            .bind(Utc::now())
            .execute(&mut *self.db)
            .await?;

        fetch_review(&mut *self.db, review_id).await?.ok_or(DbError::NotFound)
    }

    #[instrument(skip(self), fields(review_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        fetch_review(&mut *self.db, id).await
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, page = filter.page), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_REVIEWS);
        filter.push_conditions(&mut query);
        filter.push_order_and_page(&REVIEW_SCHEMA, &mut query);

        Ok(query.build_query_as::<ReviewDBResponse>().fetch_all(&mut *self.db).await?)
    }

    #[instrument(skip(self, filter), err)]
    async fn count(&mut self, filter: &Self::Filter) -> Result<i64> {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM reviews JOIN users ON users.id = reviews.user_id WHERE 1 = 1");
        filter.push_conditions(&mut query);

        Ok(query.build_query_scalar::<i64>().fetch_one(&mut *self.db).await?)
    }

    #[instrument(skip(self), fields(review_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM reviews WHERE id = ?").bind(id).execute(&mut *self.db).await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(review_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let result = sqlx::query(
            r#"
            UPDATE reviews SET
                review = COALESCE(?, review),
                rating = COALESCE(?, rating),
                tour_id = COALESCE(?, tour_id)
            WHERE id = ?
            "#,
        )
        .bind(&request.review)
        .bind(request.rating)
        .bind(request.tour_id)
        .bind(id)
        .execute(&mut *self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        fetch_review(&mut *self.db, id).await?.ok_or(DbError::NotFound)
    }
}

impl<'c> Reviews<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }

    /// All reviews of one tour, newest first. Used to embed reviews in the single-tour read.
    #[instrument(skip(self), fields(tour_id = %abbrev_uuid(&tour_id)), err)]
    pub async fn list_for_tour(&mut self, tour_id: TourId) -> Result<Vec<ReviewDBResponse>> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_REVIEWS);
        query
            .push(" AND reviews.tour_id = ")
            .push_bind(tour_id)
            .push(" ORDER BY reviews.created_at DESC, reviews.rowid DESC");

        Ok(query.build_query_as::<ReviewDBResponse>().fetch_all(&mut *self.db).await?)
    }

    /// Recompute and store a tour's rating aggregate from its current reviews.
    ///
    /// With no reviews left the tour falls back to zero ratings and the default average.
    #[instrument(skip(self), fields(tour_id = %abbrev_uuid(&tour_id)), err)]
    pub async fn recalculate_ratings(&mut self, tour_id: TourId) -> Result<TourRatingDBResponse> {
        let (quantity, average): (i64, Option<f64>) = sqlx::query_as("SELECT COUNT(*), AVG(rating) FROM reviews WHERE tour_id = ?")
            .bind(tour_id)
            .fetch_one(&mut *self.db)
            .await?;

        let rating = match average {
            Some(average) if quantity > 0 => TourRatingDBResponse {
                ratings_quantity: quantity,
                ratings_average: round_rating(average),
            },
            _ => TourRatingDBResponse {
                ratings_quantity: 0,
                ratings_average: DEFAULT_RATING,
            },
        };

        sqlx::query("UPDATE tours SET ratings_quantity = ?, ratings_average = ? WHERE id = ?")
            .bind(rating.ratings_quantity)
            .bind(rating.ratings_average)
            .bind(tour_id)
            .execute(&mut *self.db)
            .await?;

        Ok(rating)
    }
}
