//! Aggregate and geospatial queries over tours.
//!
//! Secret tours never contribute to any of these results.

use std::collections::BTreeMap;

use chrono::Datelike;
use sqlx::{FromRow, SqliteConnection, types::Json};
use tracing::instrument;

use crate::{
    api::models::tours::{MonthlyPlan, TourDistance, TourStats},
    db::{errors::Result, handlers::tours::Tours, models::tours::TourDBResponse},
};

/// Mean Earth radius used to turn a search radius into radians.
const EARTH_RADIUS_MI: f64 = 3963.2;
const EARTH_RADIUS_KM: f64 = 6378.1;
const EARTH_RADIUS_M: f64 = EARTH_RADIUS_KM * 1000.0;

/// Unit a caller measures distances in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceUnit {
    Miles,
    Kilometers,
}

impl DistanceUnit {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "mi" => Some(Self::Miles),
            "km" => Some(Self::Kilometers),
            _ => None,
        }
    }

    fn earth_radius(self) -> f64 {
        match self {
            Self::Miles => EARTH_RADIUS_MI,
            Self::Kilometers => EARTH_RADIUS_KM,
        }
    }

    /// Conversion factor from metres
    fn per_metre(self) -> f64 {
        match self {
            Self::Miles => 0.000621371,
            Self::Kilometers => 0.001,
        }
    }
}

/// Central angle in radians between two `(lat, lng)` points given in degrees.
pub fn haversine(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lng1) = (from.0.to_radians(), from.1.to_radians());
    let (lat2, lng2) = (to.0.to_radians(), to.1.to_radians());

    let dlat = lat2 - lat1;
    let dlng = lng2 - lng1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * a.sqrt().min(1.0).asin()
}

#[derive(FromRow)]
struct TourStatsRow {
    id: String,
    num_tours: i64,
    num_ratings: i64,
    avg_rating: f64,
    avg_price: f64,
    min_price: f64,
    max_price: f64,
}

impl From<TourStatsRow> for TourStats {
    fn from(row: TourStatsRow) -> Self {
        Self {
            id: row.id,
            num_tours: row.num_tours,
            num_ratings: row.num_ratings,
            avg_rating: row.avg_rating,
            avg_price: row.avg_price,
            min_price: row.min_price,
            max_price: row.max_price,
        }
    }
}

/// Per-difficulty aggregates over tours rated 4.5 or better, most expensive group first.
#[instrument(skip(db), err)]
pub async fn tour_stats(db: &mut SqliteConnection) -> Result<Vec<TourStats>> {
    let rows = sqlx::query_as::<_, TourStatsRow>(
        r#"
        SELECT
            UPPER(difficulty) AS id,
            COUNT(*) AS num_tours,
            SUM(ratings_quantity) AS num_ratings,
            AVG(ratings_average) AS avg_rating,
            AVG(price) AS avg_price,
            MIN(price) AS min_price,
            MAX(price) AS max_price
        FROM tours
        WHERE ratings_average >= 4.5 AND secret_tour = 0
        GROUP BY UPPER(difficulty)
        ORDER BY avg_price DESC
        "#,
    )
    .fetch_all(&mut *db)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

#[derive(FromRow)]
struct StartDatesRow {
    name: String,
    start_dates: Json<Vec<chrono::DateTime<chrono::Utc>>>,
}

/// Tour starts within `year`, grouped by month, busiest month first.
#[instrument(skip(db), err)]
pub async fn monthly_plan(db: &mut SqliteConnection, year: i32) -> Result<Vec<MonthlyPlan>> {
    let rows = sqlx::query_as::<_, StartDatesRow>("SELECT name, start_dates FROM tours WHERE secret_tour = 0 ORDER BY created_at, rowid")
        .fetch_all(&mut *db)
        .await?;

    let mut months: BTreeMap<u32, Vec<String>> = BTreeMap::new();
    for row in rows {
        for start in row.start_dates.0.iter().filter(|d| d.year() == year) {
            months.entry(start.month()).or_default().push(row.name.clone());
        }
    }

    let mut plan: Vec<MonthlyPlan> = months
        .into_iter()
        .map(|(month, tours)| MonthlyPlan {
            month,
            num_tour_starts: tours.len() as i64,
            tours,
        })
        .collect();
    // Stable sort keeps months in calendar order on ties
    plan.sort_by(|a, b| b.num_tour_starts.cmp(&a.num_tour_starts));
    plan.truncate(12);
    Ok(plan)
}

/// Tours whose start location lies within `distance` of `center`.
#[instrument(skip(db), err)]
pub async fn tours_within(db: &mut SqliteConnection, center: (f64, f64), distance: f64, unit: DistanceUnit) -> Result<Vec<TourDBResponse>> {
    let radius = distance / unit.earth_radius();
    let tours = Tours::new(db).list_all().await?;

    Ok(tours
        .into_iter()
        .filter(|tour| {
            tour.start_location
                .as_ref()
                .is_some_and(|start| haversine(center, (start.lat, start.lng)) <= radius)
        })
        .collect())
}

/// Distance from `center` to every located tour, nearest first.
#[instrument(skip(db), err)]
pub async fn distances(db: &mut SqliteConnection, center: (f64, f64), unit: DistanceUnit) -> Result<Vec<TourDistance>> {
    let tours = Tours::new(db).list_all().await?;

    let mut distances: Vec<TourDistance> = tours
        .into_iter()
        .filter_map(|tour| {
            let start = tour.start_location?;
            let metres = haversine(center, (start.lat, start.lng)) * EARTH_RADIUS_M;
            Some(TourDistance {
                id: tour.id,
                name: tour.name,
                distance: metres * unit.per_metre(),
            })
        })
        .collect();
    distances.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    Ok(distances)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::tours::{Difficulty, GeoPoint};
    use crate::db::handlers::repository::Repository;
    use crate::test_utils::tour_request;
    use chrono::{TimeZone, Utc};
    use sqlx::SqlitePool;

    const LOS_ANGELES: (f64, f64) = (34.111745, -118.113491);
    const MIAMI: (f64, f64) = (25.774772, -80.185942);

    fn located(name: &str, point: (f64, f64)) -> crate::db::models::tours::TourCreateDBRequest {
        let mut request = tour_request(name);
        request.start_location = Some(GeoPoint {
            lat: point.0,
            lng: point.1,
            address: None,
            description: None,
        });
        request
    }

    #[test]
    fn test_haversine() {
        assert_eq!(haversine(MIAMI, MIAMI), 0.0);

        // Los Angeles to Miami is roughly 2340 miles
        let miles = haversine(LOS_ANGELES, MIAMI) * EARTH_RADIUS_MI;
        assert!((2300.0..2380.0).contains(&miles), "got {miles}");

        let km = haversine(LOS_ANGELES, MIAMI) * EARTH_RADIUS_KM;
        assert!((3700.0..3830.0).contains(&km), "got {km}");
    }

    #[test]
    fn test_distance_unit_parse() {
        assert_eq!(DistanceUnit::parse("mi"), Some(DistanceUnit::Miles));
        assert_eq!(DistanceUnit::parse("km"), Some(DistanceUnit::Kilometers));
        assert_eq!(DistanceUnit::parse("m"), None);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_tour_stats(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut tours = Tours::new(&mut conn);

        let specs = [
            ("The Forest Hiker", Difficulty::Easy, 397.0, 4.7, false),
            ("The Sea Explorer", Difficulty::Easy, 497.0, 4.8, false),
            ("The Snow Adventurer", Difficulty::Difficult, 997.0, 4.5, false),
            ("The City Wanderer", Difficulty::Medium, 1197.0, 4.0, false),
            ("The Secret Getaway", Difficulty::Easy, 10.0, 5.0, true),
        ];
        for (name, difficulty, price, rating, secret) in specs {
            let mut request = tour_request(name);
            request.difficulty = difficulty;
            request.price = price;
            request.ratings_average = Some(rating);
            request.ratings_quantity = Some(10);
            request.secret_tour = secret;
            tours.create(&request).await.unwrap();
        }

        let stats = tour_stats(&mut conn).await.unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].id, "DIFFICULT");
        assert_eq!(stats[0].avg_price, 997.0);
        assert_eq!(stats[1].id, "EASY");
        assert_eq!(stats[1].num_tours, 2);
        assert_eq!(stats[1].num_ratings, 20);
        assert_eq!(stats[1].avg_price, 447.0);
        assert_eq!(stats[1].min_price, 397.0);
        assert_eq!(stats[1].max_price, 497.0);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_monthly_plan(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut tours = Tours::new(&mut conn);

        let date = |y, m| Utc.with_ymd_and_hms(y, m, 10, 9, 0, 0).unwrap();

        let mut first = tour_request("The Forest Hiker");
        first.start_dates = vec![date(2021, 4), date(2021, 7), date(2022, 1)];
        tours.create(&first).await.unwrap();

        let mut second = tour_request("The Sea Explorer");
        second.start_dates = vec![date(2021, 7), date(2021, 3)];
        tours.create(&second).await.unwrap();

        let mut secret = tour_request("The Secret Getaway");
        secret.start_dates = vec![date(2021, 3)];
        secret.secret_tour = true;
        tours.create(&secret).await.unwrap();

        let plan = monthly_plan(&mut conn, 2021).await.unwrap();
        assert_eq!(
            plan,
            vec![
                MonthlyPlan {
                    month: 7,
                    num_tour_starts: 2,
                    tours: vec!["The Forest Hiker".to_string(), "The Sea Explorer".to_string()],
                },
                MonthlyPlan {
                    month: 3,
                    num_tour_starts: 1,
                    tours: vec!["The Sea Explorer".to_string()],
                },
                MonthlyPlan {
                    month: 4,
                    num_tour_starts: 1,
                    tours: vec!["The Forest Hiker".to_string()],
                },
            ]
        );

        assert!(monthly_plan(&mut conn, 2030).await.unwrap().is_empty());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_geo_queries(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut tours = Tours::new(&mut conn);

        tours.create(&located("The Sea Explorer", MIAMI)).await.unwrap();
        tours.create(&located("The Star Gazer", (34.0, -118.0))).await.unwrap();
        tours.create(&tour_request("The Nowhere Tour")).await.unwrap();

        let near = tours_within(&mut conn, LOS_ANGELES, 200.0, DistanceUnit::Miles).await.unwrap();
        assert_eq!(near.len(), 1);
        assert_eq!(near[0].name, "The Star Gazer");

        let everything = tours_within(&mut conn, LOS_ANGELES, 5000.0, DistanceUnit::Kilometers).await.unwrap();
        assert_eq!(everything.len(), 2);

        let ranked = distances(&mut conn, LOS_ANGELES, DistanceUnit::Kilometers).await.unwrap();
        let names: Vec<&str> = ranked.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["The Star Gazer", "The Sea Explorer"]);
        assert!(ranked[0].distance < 20.0);
        assert!(ranked[1].distance > 3700.0);
    }
}
