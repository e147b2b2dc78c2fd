use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
};
use serde::Serialize;

use crate::{
    AppState,
    api::{
        handlers::factory::{self, Document, DocumentList},
        models::{
            pagination::ListQuery,
            reviews::ReviewResponse,
            tours::{MonthlyPlan, TourCreate, TourDistance, TourResponse, TourStats, TourUpdate},
            users::{CurrentUser, Role},
        },
    },
    auth::guard::restrict_to,
    db::{
        handlers::{
            ListFilter, Repository, Reviews, Tours,
            analytics::{self, DistanceUnit},
            tours::TOUR_SCHEMA,
        },
        models::tours::TourUpdateDBRequest,
    },
    errors::{Error, Result},
    images,
    types::TourId,
};

/// Tour galleries hold at most this many images besides the cover
const MAX_GALLERY_IMAGES: usize = 3;

/// `{status, results, data: {stats}}` style payloads for the analytics endpoints.
#[derive(Debug, Serialize)]
pub struct AnalyticsResponse<T> {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<usize>,
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct StatsData {
    pub stats: Vec<TourStats>,
}

#[derive(Debug, Serialize)]
pub struct PlanData {
    pub plan: Vec<MonthlyPlan>,
}

#[derive(Debug, Serialize)]
pub struct WithinData {
    pub data: Vec<TourResponse>,
}

#[derive(Debug, Serialize)]
pub struct DistanceData {
    pub data: Vec<TourDistance>,
}

fn success<T>(results: Option<usize>, data: T) -> Json<AnalyticsResponse<T>> {
    Json(AnalyticsResponse {
        status: "success",
        results,
        data,
    })
}

/// Parse a `lat,lng` path segment.
pub fn parse_latlng(raw: &str) -> Result<(f64, f64)> {
    let invalid = || Error::BadRequest {
        message: "Please provide latitude and longitude in the format lat,lng.".to_string(),
    };
    let (lat, lng) = raw.split_once(',').ok_or_else(invalid)?;
    let lat: f64 = lat.trim().parse().map_err(|_| invalid())?;
    let lng: f64 = lng.trim().parse().map_err(|_| invalid())?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
        return Err(invalid());
    }
    Ok((lat, lng))
}

fn parse_unit(raw: &str) -> Result<DistanceUnit> {
    DistanceUnit::parse(raw).ok_or_else(|| Error::BadRequest {
        message: "Please provide the unit as mi or km.".to_string(),
    })
}

/// The `top-5-cheap` preset, replacing any caller-supplied listing controls.
fn top_cheap_params(params: Vec<(String, String)>) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = params
        .into_iter()
        .filter(|(key, _)| !matches!(key.as_str(), "limit" | "sort" | "fields"))
        .collect();
    params.extend([
        ("limit".to_string(), "5".to_string()),
        ("sort".to_string(), "-ratingsAverage,price".to_string()),
        ("fields".to_string(), "name,price,ratingsAverage,summary,difficulty".to_string()),
    ]);
    params
}

/// List tours
#[utoipa::path(
    get,
    path = "/tours",
    tag = "tours",
    params(ListQuery),
    responses(
        (status = 200, description = "A page of tours", body = Vec<TourResponse>),
        (status = 400, description = "Unknown filter or sort field"),
        (status = 404, description = "Page past the last tour"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_tours(State(state): State<AppState>, Query(params): Query<Vec<(String, String)>>) -> Result<DocumentList> {
    let filter = ListFilter::from_query(&TOUR_SCHEMA, &params)?;
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    factory::get_all::<_, TourResponse>(&mut Tours::new(&mut conn), &filter).await
}

/// The five best rated, cheapest tours
#[utoipa::path(
    get,
    path = "/tours/top-5-cheap",
    tag = "tours",
    responses(
        (status = 200, description = "Up to five tours", body = Vec<TourResponse>),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn top_cheap_tours(state: State<AppState>, Query(params): Query<Vec<(String, String)>>) -> Result<DocumentList> {
    list_tours(state, Query(top_cheap_params(params))).await
}

/// Get a tour with its guides and reviews
#[utoipa::path(
    get,
    path = "/tours/{id}",
    tag = "tours",
    params(("id" = uuid::Uuid, Path, description = "Tour ID")),
    responses(
        (status = 200, description = "The tour", body = TourResponse),
        (status = 404, description = "No such tour"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_tour(State(state): State<AppState>, Path(id): Path<TourId>) -> Result<Document<TourResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let Document { status, data } = factory::get_one::<_, TourResponse>(&mut Tours::new(&mut conn), id, "tour").await?;

    let reviews = Reviews::new(&mut conn).list_for_tour(id).await?;
    Ok(Document {
        status,
        data: data.with_reviews(reviews.into_iter().map(ReviewResponse::from).collect()),
    })
}

/// Create a tour (admin, lead-guide)
#[utoipa::path(
    post,
    path = "/tours",
    tag = "tours",
    request_body = TourCreate,
    responses(
        (status = 201, description = "Created tour", body = TourResponse),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Insufficient role"),
        (status = 409, description = "Duplicate tour name"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_tour(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(payload): Json<TourCreate>,
) -> Result<Document<TourResponse>> {
    restrict_to(&current_user, &[Role::Admin, Role::LeadGuide])?;
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    factory::create_one(&mut Tours::new(&mut conn), payload).await
}

/// Update a tour (admin, lead-guide)
#[utoipa::path(
    patch,
    path = "/tours/{id}",
    tag = "tours",
    request_body = TourUpdate,
    params(("id" = uuid::Uuid, Path, description = "Tour ID")),
    responses(
        (status = 200, description = "Updated tour", body = TourResponse),
        (status = 400, description = "Invalid input"),
        (status = 404, description = "No such tour"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_tour(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<TourId>,
    Json(payload): Json<TourUpdate>,
) -> Result<Document<TourResponse>> {
    restrict_to(&current_user, &[Role::Admin, Role::LeadGuide])?;
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    factory::update_one(&mut Tours::new(&mut conn), id, payload, "tour").await
}

/// Delete a tour and its reviews and bookings (admin, lead-guide)
#[utoipa::path(
    delete,
    path = "/tours/{id}",
    tag = "tours",
    params(("id" = uuid::Uuid, Path, description = "Tour ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "No such tour"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn delete_tour(State(state): State<AppState>, current_user: CurrentUser, Path(id): Path<TourId>) -> Result<StatusCode> {
    restrict_to(&current_user, &[Role::Admin, Role::LeadGuide])?;
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    factory::delete_one(&mut Tours::new(&mut conn), id, "tour").await
}

/// Upload a new cover and gallery for a tour (admin, lead-guide)
#[utoipa::path(
    patch,
    path = "/tours/{id}/images",
    tag = "tours",
    request_body(content_type = "multipart/form-data", description = "`imageCover` and up to 3 `images`"),
    params(("id" = uuid::Uuid, Path, description = "Tour ID")),
    responses(
        (status = 200, description = "Tour with the new images", body = TourResponse),
        (status = 400, description = "Not an image, or too many images"),
        (status = 404, description = "No such tour"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn upload_tour_images(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<TourId>,
    mut multipart: Multipart,
) -> Result<Document<TourResponse>> {
    restrict_to(&current_user, &[Role::Admin, Role::LeadGuide])?;

    let bad_multipart = |e: axum::extract::multipart::MultipartError| Error::BadRequest { message: e.body_text() };
    let mut cover = None;
    let mut gallery = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        if name != "imageCover" && name != "images" {
            tracing::debug!(field = %name, "Ignoring multipart field");
            continue;
        }
        images::ensure_image(field.content_type())?;
        let bytes = field.bytes().await.map_err(bad_multipart)?.to_vec();

        if name == "imageCover" {
            cover = Some(bytes);
        } else if gallery.len() < MAX_GALLERY_IMAGES {
            gallery.push(bytes);
        } else {
            return Err(Error::BadRequest {
                message: format!("A tour can have at most {MAX_GALLERY_IMAGES} images besides the cover."),
            });
        }
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut tours = Tours::new(&mut conn);
    let current = tours.get_by_id(id).await?.ok_or_else(|| Error::not_found("tour", id))?;
    if cover.is_none() && gallery.is_empty() {
        return Ok(Document::ok(TourResponse::from(current)));
    }

    let public_dir = &state.config.uploads.public_dir;
    let mut update = TourUpdateDBRequest::default();
    if let Some(bytes) = cover {
        update.image_cover = Some(images::save_tour_image(public_dir, id, None, bytes).await?);
    }
    if !gallery.is_empty() {
        let mut names = Vec::with_capacity(gallery.len());
        for (index, bytes) in gallery.into_iter().enumerate() {
            names.push(images::save_tour_image(public_dir, id, Some(index), bytes).await?);
        }
        update.images = Some(names);
    }

    let updated = tours.update(id, &update).await?;
    Ok(Document::ok(TourResponse::from(updated)))
}

/// Per-difficulty statistics over highly rated tours
#[utoipa::path(
    get,
    path = "/tours/tour-stats",
    tag = "tours",
    responses(
        (status = 200, description = "Statistics, most expensive difficulty first", body = Vec<TourStats>),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn tour_stats(State(state): State<AppState>) -> Result<Json<AnalyticsResponse<StatsData>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let stats = analytics::tour_stats(&mut conn).await?;
    Ok(success(None, StatsData { stats }))
}

/// Tour starts per month of a year (admin, lead-guide, guide)
#[utoipa::path(
    get,
    path = "/tours/monthly-plan/{year}",
    tag = "tours",
    params(("year" = i32, Path, description = "Calendar year")),
    responses(
        (status = 200, description = "Busiest months first", body = Vec<MonthlyPlan>),
        (status = 400, description = "Not a year"),
        (status = 403, description = "Insufficient role"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn monthly_plan(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(year): Path<String>,
) -> Result<Json<AnalyticsResponse<PlanData>>> {
    restrict_to(&current_user, &[Role::Admin, Role::LeadGuide, Role::Guide])?;
    let year: i32 = year.parse().map_err(|_| Error::BadRequest {
        message: format!("Invalid year: {year}"),
    })?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let plan = analytics::monthly_plan(&mut conn, year).await?;
    Ok(success(None, PlanData { plan }))
}

/// Tours starting within a distance of a point
#[utoipa::path(
    get,
    path = "/tours/tours-within/{distance}/center/{latlng}/unit/{unit}",
    tag = "tours",
    params(
        ("distance" = f64, Path, description = "Search radius"),
        ("latlng" = String, Path, description = "Centre as `lat,lng`"),
        ("unit" = String, Path, description = "`mi` or `km`"),
    ),
    responses(
        (status = 200, description = "Tours within the radius", body = Vec<TourResponse>),
        (status = 400, description = "Malformed centre, distance or unit"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn tours_within(
    State(state): State<AppState>,
    Path((distance, latlng, unit)): Path<(String, String, String)>,
) -> Result<Json<AnalyticsResponse<WithinData>>> {
    let center = parse_latlng(&latlng)?;
    let unit = parse_unit(&unit)?;
    let distance: f64 = distance
        .parse()
        .ok()
        .filter(|d: &f64| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| Error::BadRequest {
            message: format!("Invalid distance: {distance}"),
        })?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let tours: Vec<TourResponse> = analytics::tours_within(&mut conn, center, distance, unit)
        .await?
        .into_iter()
        .map(TourResponse::from)
        .collect();
    Ok(success(Some(tours.len()), WithinData { data: tours }))
}

/// Distance from a point to every tour, nearest first
#[utoipa::path(
    get,
    path = "/tours/distances/{latlng}/unit/{unit}",
    tag = "tours",
    params(
        ("latlng" = String, Path, description = "Centre as `lat,lng`"),
        ("unit" = String, Path, description = "`mi` or `km`"),
    ),
    responses(
        (status = 200, description = "Distances", body = Vec<TourDistance>),
        (status = 400, description = "Malformed centre or unit"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn tour_distances(
    State(state): State<AppState>,
    Path((latlng, unit)): Path<(String, String)>,
) -> Result<Json<AnalyticsResponse<DistanceData>>> {
    let center = parse_latlng(&latlng)?;
    let unit = parse_unit(&unit)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let distances = analytics::distances(&mut conn, center, unit).await?;
    Ok(success(Some(distances.len()), DistanceData { data: distances }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::models::tours::GeoPoint,
        test_utils::{auth_header, create_test_app, create_test_app_with, create_test_config, create_test_state_with, create_test_tour, create_test_user, tour_request},
    };
    use axum_test::multipart::{MultipartForm, Part};
    use serde_json::{Value, json};
    use sqlx::SqlitePool;

    fn png() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(40, 30, image::Rgb([10, 120, 60]));
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_parse_latlng() {
        assert_eq!(parse_latlng("34.111745,-118.113491").unwrap(), (34.111745, -118.113491));
        for bad in ["", "34.1", "north,south", "95,10", "34.1,-118.1,7"] {
            let err = parse_latlng(bad).unwrap_err();
            assert_eq!(err.user_message(), "Please provide latitude and longitude in the format lat,lng.");
        }
    }

    #[test]
    fn test_top_cheap_preset_overrides_controls() {
        let params = top_cheap_params(vec![
            ("limit".to_string(), "50".to_string()),
            ("difficulty".to_string(), "easy".to_string()),
        ]);
        assert!(params.contains(&("difficulty".to_string(), "easy".to_string())));
        assert!(params.contains(&("limit".to_string(), "5".to_string())));
        assert!(!params.contains(&("limit".to_string(), "50".to_string())));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_public_reads_and_filters(pool: SqlitePool) {
        create_test_tour(&pool, "The Forest Hiker").await;
        let mut conn = pool.acquire().await.unwrap();
        let mut hard = tour_request("The Snow Adventurer");
        hard.difficulty = crate::api::models::tours::Difficulty::Difficult;
        hard.price = 997.0;
        Tours::new(&mut conn).create(&hard).await.unwrap();
        let mut secret = tour_request("The Secret Garden");
        secret.secret_tour = true;
        Tours::new(&mut conn).create(&secret).await.unwrap();
        drop(conn);

        let server = create_test_app(pool);

        let body: Value = server.get("/api/v1/tours").await.json();
        assert_eq!(body["status"], "success");
        assert_eq!(body["results"], 2);

        let body: Value = server.get("/api/v1/tours?price%5Blt%5D=500").await.json();
        assert_eq!(body["results"], 1);
        assert_eq!(body["data"]["data"][0]["name"], "The Forest Hiker");

        let body: Value = server.get("/api/v1/tours/top-5-cheap").await.json();
        let first = body["data"]["data"][0].as_object().unwrap();
        assert!(first.contains_key("ratingsAverage"));
        assert!(!first.contains_key("guides"));

        server.get("/api/v1/tours?colour=red").await.assert_status_bad_request();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_single_read_embeds_reviews(pool: SqlitePool) {
        let tour = create_test_tour(&pool, "The Sea Explorer").await;
        let reviewer = create_test_user(&pool, Role::User).await;
        let config = create_test_config();
        let server = create_test_app(pool);

        let (name, value) = auth_header(reviewer.id, &config);
        server
            .post(&format!("/api/v1/tours/{}/reviews", tour.id))
            .add_header(name, value)
            .json(&json!({ "review": "Loved every minute", "rating": 4 }))
            .await
            .assert_status(StatusCode::CREATED);

        let body: Value = server.get(&format!("/api/v1/tours/{}", tour.id)).await.json();
        let data = &body["data"]["data"];
        assert_eq!(data["ratingsQuantity"], 1);
        assert_eq!(data["ratingsAverage"], 4.0);
        assert_eq!(data["reviews"].as_array().unwrap().len(), 1);
        assert_eq!(data["reviews"][0]["user"]["name"], reviewer.name);

        let response = server.get(&format!("/api/v1/tours/{}", uuid::Uuid::new_v4())).await;
        response.assert_status_not_found();
        assert_eq!(response.json::<Value>()["message"], "No document found with that ID");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_mutations_require_staff(pool: SqlitePool) {
        let user = create_test_user(&pool, Role::User).await;
        let lead = create_test_user(&pool, Role::LeadGuide).await;
        let config = create_test_config();
        let server = create_test_app(pool);

        let payload = json!({
            "name": "The Park Camper",
            "duration": 10,
            "maxGroupSize": 15,
            "difficulty": "medium",
            "price": 1497,
            "summary": "Breathing in Nature in America's most spectacular National Parks",
            "imageCover": "tour-5-cover.jpg",
        });

        let response = server.post("/api/v1/tours").json(&payload).await;
        response.assert_status_unauthorized();

        let (name, value) = auth_header(user.id, &config);
        server.post("/api/v1/tours").add_header(name, value).json(&payload).await.assert_status_forbidden();

        let (name, value) = auth_header(lead.id, &config);
        let response = server.post("/api/v1/tours").add_header(name.clone(), value.clone()).json(&payload).await;
        response.assert_status(StatusCode::CREATED);
        let created: Value = response.json();
        let id = created["data"]["data"]["id"].as_str().unwrap().to_string();
        assert_eq!(created["data"]["data"]["slug"], "the-park-camper");

        let response = server
            .patch(&format!("/api/v1/tours/{id}"))
            .add_header(name.clone(), value.clone())
            .json(&json!({ "name": "The Park Campers" }))
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["data"]["data"]["slug"], "the-park-campers");

        // Same name again collides on the unique index
        let response = server.post("/api/v1/tours").add_header(name.clone(), value.clone()).json(&json!({
            "name": "The Park Campers",
            "duration": 10,
            "maxGroupSize": 15,
            "difficulty": "medium",
            "price": 1497,
            "summary": "Again",
            "imageCover": "tour-5-cover.jpg",
        })).await;
        response.assert_status(StatusCode::CONFLICT);

        server
            .delete(&format!("/api/v1/tours/{id}"))
            .add_header(name, value)
            .await
            .assert_status(StatusCode::NO_CONTENT);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_geo_endpoints(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut near = tour_request("The City Wanderer");
        near.start_location = Some(GeoPoint {
            lat: 34.111745,
            lng: -118.113491,
            address: None,
            description: None,
        });
        Tours::new(&mut conn).create(&near).await.unwrap();
        let mut far = tour_request("The Sports Lover");
        far.start_location = Some(GeoPoint {
            lat: 25.774772,
            lng: -80.185942,
            address: None,
            description: None,
        });
        Tours::new(&mut conn).create(&far).await.unwrap();
        drop(conn);

        let server = create_test_app(pool);

        let body: Value = server.get("/api/v1/tours/tours-within/200/center/34.0,-118.2/unit/mi").await.json();
        assert_eq!(body["results"], 1);
        assert_eq!(body["data"]["data"][0]["name"], "The City Wanderer");

        let body: Value = server.get("/api/v1/tours/distances/34.0,-118.2/unit/km").await.json();
        assert_eq!(body["data"]["data"][0]["name"], "The City Wanderer");
        assert_eq!(body["data"]["data"][1]["name"], "The Sports Lover");

        let response = server.get("/api/v1/tours/distances/somewhere/unit/km").await;
        response.assert_status_bad_request();
        assert_eq!(
            response.json::<Value>()["message"],
            "Please provide latitude and longitude in the format lat,lng."
        );

        server.get("/api/v1/tours/distances/34.0,-118.2/unit/ly").await.assert_status_bad_request();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_monthly_plan_requires_guide(pool: SqlitePool) {
        let user = create_test_user(&pool, Role::User).await;
        let guide = create_test_user(&pool, Role::Guide).await;
        let config = create_test_config();
        let server = create_test_app(pool);

        let (name, value) = auth_header(user.id, &config);
        server.get("/api/v1/tours/monthly-plan/2021").add_header(name, value).await.assert_status_forbidden();

        let (name, value) = auth_header(guide.id, &config);
        let response = server.get("/api/v1/tours/monthly-plan/2021").add_header(name, value).await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["data"]["plan"], json!([]));

        server.get("/api/v1/tours/tour-stats").await.assert_status_ok();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_upload_tour_images(pool: SqlitePool) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = create_test_config();
        config.uploads.public_dir = dir.path().to_path_buf();
        let admin = create_test_user(&pool, Role::Admin).await;
        let tour = create_test_tour(&pool, "The Wine Taster").await;
        let (name, value) = auth_header(admin.id, &config);
        let server = create_test_app_with(create_test_state_with(pool, config, None));

        let form = MultipartForm::new()
            .add_part("imageCover", Part::bytes(png()).file_name("cover.png").mime_type("image/png"))
            .add_part("images", Part::bytes(png()).file_name("1.png").mime_type("image/png"))
            .add_part("images", Part::bytes(png()).file_name("2.png").mime_type("image/png"));
        let response = server
            .patch(&format!("/api/v1/tours/{}/images", tour.id))
            .add_header(name, value)
            .multipart(form)
            .await;
        response.assert_status_ok();

        let body: Value = response.json();
        let cover = body["data"]["data"]["imageCover"].as_str().unwrap();
        assert!(cover.ends_with("-cover.jpeg"));
        assert!(dir.path().join("img/tours").join(cover).exists());
        let images: Vec<&str> = body["data"]["data"]["images"].as_array().unwrap().iter().map(|v| v.as_str().unwrap()).collect();
        assert_eq!(images.len(), 2);
        assert!(images[1].ends_with("-2.jpeg"));
    }
}
