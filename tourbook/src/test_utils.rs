//! Shared fixtures for unit and HTTP tests.

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, header};
use axum_test::TestServer;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    AppState,
    api::models::{
        tours::Difficulty,
        users::Role,
    },
    auth::{password, session},
    config::{Config, EmailTransportConfig, PasswordConfig},
    db::{
        handlers::{Repository, Tours, Users},
        models::{
            tours::{TourCreateDBRequest, TourDBResponse},
            users::{UserCreateDBRequest, UserDBResponse},
        },
    },
    payment_providers::PaymentProvider,
};

/// Password of every user made by [`create_test_user`].
pub const TEST_PASSWORD: &str = "test-pass-1234";

pub fn create_test_config() -> Config {
    // Mail and uploads land in per-process temp directories
    let temp_root = std::env::temp_dir().join(format!("tourbook-test-{}", std::process::id()));

    let mut config = Config {
        secret_key: Some("test-secret-key-for-testing-only".to_string()),
        base_url: "http://localhost:3000".to_string(),
        ..Default::default()
    };
    config.auth.password = PasswordConfig {
        argon2_memory_kib: 1024,
        argon2_iterations: 1,
        ..Default::default()
    };
    config.auth.session.cookie_secure = false;
    config.email.transport = EmailTransportConfig::File {
        path: temp_root.join("emails").to_string_lossy().to_string(),
    };
    config.uploads.public_dir = temp_root.join("public");
    config
}

pub fn create_test_state(pool: SqlitePool) -> AppState {
    create_test_state_with(pool, create_test_config(), None)
}

pub fn create_test_state_with(pool: SqlitePool, config: Config, payments: Option<Arc<dyn PaymentProvider>>) -> AppState {
    AppState::builder().db(pool).config(config).maybe_payments(payments).build()
}

/// The full router over a fresh database.
pub fn create_test_app(pool: SqlitePool) -> TestServer {
    create_test_app_with(create_test_state(pool))
}

pub fn create_test_app_with(state: AppState) -> TestServer {
    let router = crate::build_router(state).expect("Failed to build router");
    TestServer::new(router).expect("Failed to create test server")
}

/// Create an active user with [`TEST_PASSWORD`] and a unique email.
pub async fn create_test_user(pool: &SqlitePool, role: Role) -> UserDBResponse {
    let config = create_test_config();
    let password_hash = password::hash_password(TEST_PASSWORD.to_string(), password::Argon2Params::from(&config.auth.password))
        .await
        .expect("Failed to hash test password");

    let id = Uuid::new_v4().simple().to_string();
    let request = UserCreateDBRequest {
        name: format!("Test {} {}", role.as_str(), &id[..8]),
        email: format!("{}-{}@example.com", role.as_str(), &id[..12]),
        photo: None,
        role,
        password_hash,
    };

    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    Users::new(&mut conn).create(&request).await.expect("Failed to create test user")
}

/// A complete, valid tour with no guides, dates or location.
pub fn tour_request(name: &str) -> TourCreateDBRequest {
    TourCreateDBRequest {
        name: name.to_string(),
        duration: 5,
        max_group_size: 25,
        difficulty: Difficulty::Easy,
        ratings_average: None,
        ratings_quantity: None,
        price: 397.0,
        price_discount: None,
        summary: "Breathtaking hike through the Canadian Banff National Park".to_string(),
        description: None,
        image_cover: "tour-1-cover.jpg".to_string(),
        images: Vec::new(),
        start_dates: Vec::new(),
        secret_tour: false,
        start_location: None,
        locations: Vec::new(),
        guides: Vec::new(),
    }
}

pub async fn create_test_tour(pool: &SqlitePool, name: &str) -> TourDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    Tours::new(&mut conn).create(&tour_request(name)).await.expect("Failed to create test tour")
}

/// `Authorization: Bearer <token>` for a user.
pub fn auth_header(user_id: Uuid, config: &Config) -> (HeaderName, HeaderValue) {
    let token = session::create_session_token(user_id, config).expect("Failed to create session token");
    let value = HeaderValue::from_str(&format!("Bearer {token}")).expect("Invalid header value");
    (header::AUTHORIZATION, value)
}
