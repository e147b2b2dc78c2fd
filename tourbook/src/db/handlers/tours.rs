//! Database repository for tours.
//!
//! Secret tours are excluded from every read, update and delete. Reads eagerly join the guides.

use std::collections::HashMap;

use crate::types::{TourId, UserId, abbrev_uuid};
use crate::{
    api::models::tours::{Difficulty, GeoPoint, TourLocation},
    db::{
        errors::{DbError, Result},
        handlers::{
            listing::{EntitySchema, FieldKind, FieldSpec, ListFilter},
            repository::Repository,
        },
        models::tours::{GuideDBResponse, TourCreateDBRequest, TourDBResponse, TourUpdateDBRequest},
    },
};
use chrono::{DateTime, Utc};
use sqlx::{Connection, FromRow, QueryBuilder, Sqlite, SqliteConnection, types::Json};
use tracing::instrument;
use uuid::Uuid;

/// Fields the tour list may be filtered and sorted on
pub const TOUR_SCHEMA: EntitySchema = EntitySchema {
    table: "tours",
    fields: &[
        FieldSpec::new("id", "tours.id", FieldKind::Id),
        FieldSpec::new("name", "tours.name", FieldKind::Text),
        FieldSpec::new("slug", "tours.slug", FieldKind::Text),
        FieldSpec::new("duration", "tours.duration", FieldKind::Integer),
        FieldSpec::new("maxGroupSize", "tours.max_group_size", FieldKind::Integer),
        FieldSpec::new("difficulty", "tours.difficulty", FieldKind::Text),
        FieldSpec::new("ratingsAverage", "tours.ratings_average", FieldKind::Number),
        FieldSpec::new("ratingsQuantity", "tours.ratings_quantity", FieldKind::Integer),
        FieldSpec::new("price", "tours.price", FieldKind::Number),
        FieldSpec::new("priceDiscount", "tours.price_discount", FieldKind::Number),
        FieldSpec::new("createdAt", "tours.created_at", FieldKind::Timestamp),
    ],
};

/// Lower-case, URL-safe form of a tour name: "The Sea Explorer" -> "the-sea-explorer".
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Round to one decimal place, the precision ratings are stored with.
pub fn round_rating(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

// Database entity model
#[derive(Debug, Clone, FromRow)]
struct Tour {
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
    pub images: Json<Vec<String>>,
    pub start_dates: Json<Vec<DateTime<Utc>>>,
    pub secret_tour: bool,
    pub start_lat: Option<f64>,
    pub start_lng: Option<f64>,
    pub start_address: Option<String>,
    pub start_description: Option<String>,
    pub locations: Json<Vec<TourLocation>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct TourGuideRow {
    tour_id: TourId,
    #[sqlx(flatten)]
    guide: GuideDBResponse,
}

impl From<(Tour, Vec<GuideDBResponse>)> for TourDBResponse {
    fn from((tour, guides): (Tour, Vec<GuideDBResponse>)) -> Self {
        let start_location = match (tour.start_lat, tour.start_lng) {
            (Some(lat), Some(lng)) => Some(GeoPoint {
                lat,
                lng,
                address: tour.start_address,
                description: tour.start_description,
            }),
            _ => None,
        };

        Self {
            id: tour.id,
            name: tour.name,
            slug: tour.slug,
            duration: tour.duration,
            max_group_size: tour.max_group_size,
            difficulty: tour.difficulty,
            ratings_average: tour.ratings_average,
            ratings_quantity: tour.ratings_quantity,
            price: tour.price,
            price_discount: tour.price_discount,
            summary: tour.summary,
            description: tour.description,
            image_cover: tour.image_cover,
            images: tour.images.0,
            start_dates: tour.start_dates.0,
            secret_tour: tour.secret_tour,
            start_location,
            locations: tour.locations.0,
            guides,
            created_at: tour.created_at,
            updated_at: tour.updated_at,
        }
    }
}

pub struct Tours<'c> {
    db: &'c mut SqliteConnection,
}

/// Fetch guides for a set of tours, in the order they were assigned. Inactive users are skipped.
async fn load_guides(conn: &mut SqliteConnection, tour_ids: &[TourId]) -> Result<HashMap<TourId, Vec<GuideDBResponse>>> {
    let mut guides: HashMap<TourId, Vec<GuideDBResponse>> = HashMap::new();
    if tour_ids.is_empty() {
        return Ok(guides);
    }

    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT tg.tour_id, u.id, u.name, u.email, u.photo, u.role \
         FROM tour_guides tg JOIN users u ON u.id = tg.user_id \
         WHERE u.active = 1 AND tg.tour_id IN (",
    );
    let mut ids = query.separated(", ");
    for id in tour_ids {
        ids.push_bind(*id);
    }
    query.push(") ORDER BY tg.position");

    let rows = query.build_query_as::<TourGuideRow>().fetch_all(&mut *conn).await?;
    for row in rows {
        guides.entry(row.tour_id).or_default().push(row.guide);
    }
    Ok(guides)
}

async fn with_guides(conn: &mut SqliteConnection, tours: Vec<Tour>) -> Result<Vec<TourDBResponse>> {
    let ids: Vec<TourId> = tours.iter().map(|t| t.id).collect();
    let mut guides = load_guides(conn, &ids).await?;
    Ok(tours
        .into_iter()
        .map(|tour| {
            let tour_guides = guides.remove(&tour.id).unwrap_or_default();
            TourDBResponse::from((tour, tour_guides))
        })
        .collect())
}

async fn replace_guides(conn: &mut SqliteConnection, tour_id: TourId, guides: &[UserId]) -> Result<()> {
    sqlx::query("DELETE FROM tour_guides WHERE tour_id = ?")
        .bind(tour_id)
        .execute(&mut *conn)
        .await?;

    for (position, user_id) in guides.iter().enumerate() {
        sqlx::query("INSERT OR IGNORE INTO tour_guides (tour_id, user_id, position) VALUES (?, ?, ?)")
            .bind(tour_id)
            .bind(user_id)
            .bind(position as i64)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn fetch_visible(conn: &mut SqliteConnection, id: TourId) -> Result<Option<TourDBResponse>> {
    let tour = sqlx::query_as::<_, Tour>("SELECT * FROM tours WHERE id = ? AND secret_tour = 0")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    match tour {
        Some(tour) => Ok(with_guides(conn, vec![tour]).await?.pop()),
        None => Ok(None),
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Tours<'c> {
    type CreateRequest = TourCreateDBRequest;
    type UpdateRequest = TourUpdateDBRequest;
    type Response = TourDBResponse;
    type Id = TourId;
    type Filter = ListFilter;

    #[instrument(skip(self, request), fields(name = %request.name), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let tour_id = Uuid::new_v4();
        let now = Utc::now();
        let start = request.start_location.as_ref();

        let mut tx = self.db.begin().await?;

        let tour = sqlx::query_as::<_, Tour>(
            r#"
            INSERT INTO tours (
                id, name, slug, duration, max_group_size, difficulty, ratings_average, ratings_quantity,
                price, price_discount, summary, description, image_cover, images, start_dates, secret_tour,
                start_lat, start_lng, start_address, start_description, locations, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, COALESCE(?, 4.5), COALESCE(?, 0), ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(tour_id)
        .bind(&request.name)
        .bind(slugify(&request.name))
        .bind(request.duration)
        .bind(request.max_group_size)
        .bind(request.difficulty)
        .bind(request.ratings_average.map(round_rating))
        .bind(request.ratings_quantity)
        .bind(request.price)
        .bind(request.price_discount)
        .bind(&request.summary)
        .bind(&request.description)
        .bind(&request.image_cover)
        .bind(Json(&request.images))
        .bind(Json(&request.start_dates))
        .bind(request.secret_tour)
        .bind(start.map(|p| p.lat))
        .bind(start.map(|p| p.lng))
        .bind(start.and_then(|p| p.address.clone()))
        .bind(start.and_then(|p| p.description.clone()))
        .bind(Json(&request.locations))
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        replace_guides(&mut tx, tour_id, &request.guides).await?;
        let created = with_guides(&mut tx, vec![tour]).await?.pop().ok_or(DbError::NotFound)?;

        tx.commit().await?;
        Ok(created)
    }

    #[instrument(skip(self), fields(tour_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        fetch_visible(&mut *self.db, id).await
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, page = filter.page), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM tours WHERE secret_tour = 0");
        filter.push_conditions(&mut query);
        filter.push_order_and_page(&TOUR_SCHEMA, &mut query);

        let tours = query.build_query_as::<Tour>().fetch_all(&mut *self.db).await?;
        with_guides(&mut *self.db, tours).await
    }

    #[instrument(skip(self, filter), err)]
    async fn count(&mut self, filter: &Self::Filter) -> Result<i64> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM tours WHERE secret_tour = 0");
        filter.push_conditions(&mut query);

        Ok(query.build_query_scalar::<i64>().fetch_one(&mut *self.db).await?)
    }

    #[instrument(skip(self), fields(tour_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tours WHERE id = ? AND secret_tour = 0")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(tour_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let mut tx = self.db.begin().await?;

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE tours SET ");
        {
            let mut set = query.separated(", ");
            if let Some(name) = &request.name {
                set.push("name = ").push_bind_unseparated(name.clone());
                // Slug follows the name
                set.push("slug = ").push_bind_unseparated(slugify(name));
            }
            if let Some(duration) = request.duration {
                set.push("duration = ").push_bind_unseparated(duration);
            }
            if let Some(size) = request.max_group_size {
                set.push("max_group_size = ").push_bind_unseparated(size);
            }
            if let Some(difficulty) = request.difficulty {
                set.push("difficulty = ").push_bind_unseparated(difficulty);
            }
            if let Some(average) = request.ratings_average {
                set.push("ratings_average = ").push_bind_unseparated(round_rating(average));
            }
            if let Some(quantity) = request.ratings_quantity {
                set.push("ratings_quantity = ").push_bind_unseparated(quantity);
            }
            if let Some(price) = request.price {
                set.push("price = ").push_bind_unseparated(price);
            }
            if let Some(discount) = request.price_discount {
                set.push("price_discount = ").push_bind_unseparated(discount);
            }
            if let Some(summary) = &request.summary {
                set.push("summary = ").push_bind_unseparated(summary.clone());
            }
            if let Some(description) = &request.description {
                set.push("description = ").push_bind_unseparated(description.clone());
            }
            if let Some(cover) = &request.image_cover {
                set.push("image_cover = ").push_bind_unseparated(cover.clone());
            }
            if let Some(images) = &request.images {
                set.push("images = ").push_bind_unseparated(Json(images.clone()));
            }
            if let Some(dates) = &request.start_dates {
                set.push("start_dates = ").push_bind_unseparated(Json(dates.clone()));
            }
            if let Some(secret) = request.secret_tour {
                set.push("secret_tour = ").push_bind_unseparated(secret);
            }
            if let Some(start) = &request.start_location {
                set.push("start_lat = ").push_bind_unseparated(start.lat);
                set.push("start_lng = ").push_bind_unseparated(start.lng);
                set.push("start_address = ").push_bind_unseparated(start.address.clone());
                set.push("start_description = ").push_bind_unseparated(start.description.clone());
            }
            if let Some(locations) = &request.locations {
                set.push("locations = ").push_bind_unseparated(Json(locations.clone()));
            }
            set.push("updated_at = ").push_bind_unseparated(Utc::now());
        }
        query.push(" WHERE id = ").push_bind(id).push(" AND secret_tour = 0 RETURNING *");

        let tour = query
            .build_query_as::<Tour>()
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(DbError::NotFound)?;

        if let Some(guides) = &request.guides {
            replace_guides(&mut tx, id, guides).await?;
        }
        let updated = with_guides(&mut tx, vec![tour]).await?.pop().ok_or(DbError::NotFound)?;

        tx.commit().await?;
        Ok(updated)
    }
}

impl<'c> Tours<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_slug(&mut self, slug: &str) -> Result<Option<TourDBResponse>> {
        let tour = sqlx::query_as::<_, Tour>("SELECT * FROM tours WHERE slug = ? AND secret_tour = 0")
            .bind(slug)
            .fetch_optional(&mut *self.db)
            .await?;

        match tour {
            Some(tour) => Ok(with_guides(&mut *self.db, vec![tour]).await?.pop()),
            None => Ok(None),
        }
    }

    /// Tours the user holds at least one booking for
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn list_booked_by(&mut self, user_id: UserId) -> Result<Vec<TourDBResponse>> {
        let tours = sqlx::query_as::<_, Tour>(
            r#"
            SELECT * FROM tours
            WHERE secret_tour = 0 AND id IN (SELECT tour_id FROM bookings WHERE user_id = ?)
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *self.db)
        .await?;

        with_guides(&mut *self.db, tours).await
    }

    /// Every visible tour, unpaginated. Used by the analytics queries and the overview page.
    #[instrument(skip(self), err)]
    pub async fn list_all(&mut self) -> Result<Vec<TourDBResponse>> {
        let tours = sqlx::query_as::<_, Tour>("SELECT * FROM tours WHERE secret_tour = 0 ORDER BY created_at DESC, rowid DESC")
            .fetch_all(&mut *self.db)
            .await?;

        with_guides(&mut *self.db, tours).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::users::Role;
    use crate::db::handlers::listing::ListFilter;
    use crate::test_utils::{create_test_user, tour_request};
    use sqlx::SqlitePool;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("The Forest Hiker"), "the-forest-hiker");
        assert_eq!(slugify("  The   Sea  Explorer  "), "the-sea-explorer");
        assert_eq!(slugify("Über Alpen"), "über-alpen");
        assert_eq!(slugify("Snow--Adventurer!"), "snow-adventurer");
    }

    #[test]
    fn test_round_rating() {
        assert_eq!(round_rating(4.666), 4.7);
        assert_eq!(round_rating(4.0), 4.0);
        assert_eq!(round_rating(3.33), 3.3);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_tour_derives_slug_and_defaults(pool: SqlitePool) {
        let guide = create_test_user(&pool, Role::LeadGuide).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Tours::new(&mut conn);

        let mut request = tour_request("The Forest Hiker");
        request.guides = vec![guide.id];
        request.start_location = Some(GeoPoint {
            lat: 51.417611,
            lng: -116.214531,
            address: Some("Banff, CAN".to_string()),
            description: Some("Banff National Park".to_string()),
        });

        let tour = repo.create(&request).await.unwrap();
        assert_eq!(tour.slug, "the-forest-hiker");
        assert_eq!(tour.ratings_average, 4.5);
        assert_eq!(tour.ratings_quantity, 0);
        assert_eq!(tour.guides.len(), 1);
        assert_eq!(tour.guides[0].id, guide.id);
        assert_eq!(tour.start_location.as_ref().map(|p| p.lat), Some(51.417611));

        let fetched = repo.get_by_id(tour.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "The Forest Hiker");
        assert_eq!(fetched.guides[0].role, Role::LeadGuide);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_secret_tours_are_hidden(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Tours::new(&mut conn);

        repo.create(&tour_request("The Sea Explorer")).await.unwrap();
        let mut secret = tour_request("The Secret Getaway");
        secret.secret_tour = true;
        let secret = repo.create(&secret).await.unwrap();

        assert!(repo.get_by_id(secret.id).await.unwrap().is_none());
        assert!(repo.get_by_slug("the-secret-getaway").await.unwrap().is_none());

        let filter = ListFilter::default();
        let tours = repo.list(&filter).await.unwrap();
        assert_eq!(tours.len(), 1);
        assert_eq!(tours[0].name, "The Sea Explorer");
        assert_eq!(repo.count(&filter).await.unwrap(), 1);
        assert!(!repo.delete(secret.id).await.unwrap());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_rename_updates_slug(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Tours::new(&mut conn);

        let tour = repo.create(&tour_request("The Forest Hiker")).await.unwrap();
        let updated = repo
            .update(
                tour.id,
                &TourUpdateDBRequest {
                    name: Some("The Mountain Hiker".to_string()),
                    price: Some(550.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.slug, "the-mountain-hiker");
        assert_eq!(updated.price, 550.0);
        assert_eq!(updated.duration, tour.duration);

        let missing = repo.update(Uuid::new_v4(), &TourUpdateDBRequest::default()).await;
        assert!(matches!(missing, Err(DbError::NotFound)));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_duplicate_name_is_unique_violation(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Tours::new(&mut conn);

        repo.create(&tour_request("The Forest Hiker")).await.unwrap();
        let err = repo.create(&tour_request("The Forest Hiker")).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { table: Some(ref t), .. } if t == "tours"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_filters_and_sorts(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Tours::new(&mut conn);

        for (name, price) in [("The Cheap Escape", 297.0), ("The Middle Road", 997.0), ("The Luxury Voyage", 2997.0)] {
            let mut request = tour_request(name);
            request.price = price;
            repo.create(&request).await.unwrap();
        }

        let params = vec![
            ("price[gte]".to_string(), "500".to_string()),
            ("sort".to_string(), "-price".to_string()),
        ];
        let filter = ListFilter::from_query(&TOUR_SCHEMA, &params).unwrap();
        let tours = repo.list(&filter).await.unwrap();
        let names: Vec<&str> = tours.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["The Luxury Voyage", "The Middle Road"]);
        assert_eq!(repo.count(&filter).await.unwrap(), 2);
    }
}
