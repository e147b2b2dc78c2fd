//! Database repository for bookings.

use crate::types::{BookingId, UserId, abbrev_uuid};
use crate::db::{
    errors::{DbError, Result},
    handlers::{
        listing::{EntitySchema, FieldKind, FieldSpec, ListFilter},
        repository::Repository,
    },
    models::bookings::{BookingCreateDBRequest, BookingDBResponse, BookingUpdateDBRequest},
};
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::instrument;
use uuid::Uuid;

/// Fields the booking list may be filtered and sorted on
pub const BOOKING_SCHEMA: EntitySchema = EntitySchema {
    table: "bookings",
    fields: &[
        FieldSpec::new("id", "bookings.id", FieldKind::Id),
        FieldSpec::new("tour", "bookings.tour_id", FieldKind::Id),
        FieldSpec::new("user", "bookings.user_id", FieldKind::Id),
        FieldSpec::new("price", "bookings.price", FieldKind::Number),
        FieldSpec::new("paid", "bookings.paid", FieldKind::Boolean),
        FieldSpec::new("createdAt", "bookings.created_at", FieldKind::Timestamp),
    ],
};

const SELECT_BOOKINGS: &str = "SELECT bookings.id, bookings.tour_id, tours.name AS tour_name, bookings.user_id, \
     users.name AS user_name, users.email AS user_email, bookings.price, bookings.paid, \
     bookings.checkout_session_id, bookings.created_at \
     FROM bookings \
     JOIN tours ON tours.id = bookings.tour_id \
     JOIN users ON users.id = bookings.user_id \
     WHERE 1 = 1";

pub struct Bookings<'c> {
    db: &'c mut SqliteConnection,
}

async fn fetch_booking(conn: &mut SqliteConnection, id: BookingId) -> Result<Option<BookingDBResponse>> {
    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_BOOKINGS);
    query.push(" AND bookings.id = ").push_bind(id);

    Ok(query.build_query_as::<BookingDBResponse>().fetch_optional(&mut *conn).await?)
}

#[async_trait::async_trait]
impl<'c> Repository for Bookings<'c> {
    type CreateRequest = BookingCreateDBRequest;
    type UpdateRequest = BookingUpdateDBRequest;
    type Response = BookingDBResponse;
    type Id = BookingId;
    type Filter = ListFilter;

    #[instrument(skip(self, request), fields(tour_id = %abbrev_uuid(&request.tour_id), user_id = %abbrev_uuid(&request.user_id)), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let booking_id = Uuid::new_v4();

        sqlx::query("INSERT INTO bookings (id, tour_id, user_id, price, paid, checkout_session_id, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)")
            .bind(booking_id)
            .bind(request.tour_id)
            .bind(request.user_id)
            .bind(request.price)
            .bind(request.paid)
            .bind(&request.checkout_session_id)
            .bind(Utc::now())
            .execute(&mut *self.db)
            .await?;

        fetch_booking(&mut *self.db, booking_id).await?.ok_or(DbError::NotFound)
    }

    #[instrument(skip(self), fields(booking_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        fetch_booking(&mut *self.db, id).await
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, page = filter.page), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_BOOKINGS);
        filter.push_conditions(&mut query);
        filter.push_order_and_page(&BOOKING_SCHEMA, &mut query);

        Ok(query.build_query_as::<BookingDBResponse>().fetch_all(&mut *self.db).await?)
    }

    #[instrument(skip(self, filter), err)]
    async fn count(&mut self, filter: &Self::Filter) -> Result<i64> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT COUNT(*) FROM bookings \
             JOIN tours ON tours.id = bookings.tour_id \
             JOIN users ON users.id = bookings.user_id \
             WHERE 1 = 1",
        );
        filter.push_conditions(&mut query);

        Ok(query.build_query_scalar::<i64>().fetch_one(&mut *self.db).await?)
    }

    #[instrument(skip(self), fields(booking_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM bookings WHERE id = ?").bind(id).execute(&mut *self.db).await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(booking_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let result = sqlx::query("UPDATE bookings SET price = COALESCE(?, price), paid = COALESCE(?, paid) WHERE id = ?")
            .bind(request.price)
            .bind(request.paid)
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        fetch_booking(&mut *self.db, id).await?.ok_or(DbError::NotFound)
    }
}

impl<'c> Bookings<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }

    /// Record the booking for a completed checkout.
    ///
    /// Returns the booking and whether it was created by this call; a replayed checkout session
    /// yields the booking stored the first time.
    #[instrument(skip(self, request), fields(session_id = ?request.checkout_session_id), err)]
    pub async fn create_from_checkout(&mut self, request: &BookingCreateDBRequest) -> Result<(BookingDBResponse, bool)> {
        let Some(session_id) = request.checkout_session_id.as_deref() else {
            return Ok((self.create(request).await?, true));
        };

        let result = sqlx::query(
            r#"
            INSERT INTO bookings (id, tour_id, user_id, price, paid, checkout_session_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (checkout_session_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.tour_id)
        .bind(request.user_id)
        .bind(request.price)
        .bind(request.paid)
        .bind(session_id)
        .bind(Utc::now())
        .execute(&mut *self.db)
        .await?;

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_BOOKINGS);
        query.push(" AND bookings.checkout_session_id = ").push_bind(session_id);
        let booking = query
            .build_query_as::<BookingDBResponse>()
            .fetch_optional(&mut *self.db)
            .await?
            .ok_or(DbError::NotFound)?;

        Ok((booking, result.rows_affected() > 0))
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn list_for_user(&mut self, user_id: UserId) -> Result<Vec<BookingDBResponse>> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_BOOKINGS);
        query
            .push(" AND bookings.user_id = ")
            .push_bind(user_id)
            .push(" ORDER BY bookings.created_at DESC, bookings.rowid DESC");

        Ok(query.build_query_as::<BookingDBResponse>().fetch_all(&mut *self.db).await?)
    }
}
