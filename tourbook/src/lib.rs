//! # tourbook: tour booking service
//!
//! `tourbook` runs a tour booking site: a catalogue of tours with geo queries and analytics,
//! user accounts with password reset, reviews that keep each tour's rating aggregate current,
//! and bookings paid through a hosted checkout. It serves a JSON REST API under `/api/v1` and a
//! small set of server-rendered pages.
//!
//! ## Architecture
//!
//! The application is built on [Axum](https://github.com/tokio-rs/axum) for the HTTP layer and
//! uses SQLite through `sqlx` for all persistence. Migrations are embedded and run at start-up.
//!
//! ### Request Flow
//!
//! A request to `/api/v1/*` is routed to a handler in [`api::handlers`]. Handlers that need a
//! signed-in user take the [`CurrentUser`](api::models::users::CurrentUser) extractor, which
//! reads the session token from the `Authorization` header or the `jwt` cookie, verifies it, and
//! reloads the user so deactivated accounts and changed passwords take effect immediately. Role
//! checks happen in the handler. Work goes through the repositories in [`db::handlers`], and
//! failures become [`errors::Error`], which renders the `{status, message}` envelope.
//!
//! Pages (`/`, `/tour/{slug}`, `/me`, ...) resolve the user softly: a missing or invalid token
//! renders the page anonymously instead of failing.
//!
//! Payments go through a [`payment_providers::PaymentProvider`]. The provider's signed callback
//! lands on `/webhook-checkout`, which reads the raw body so the signature can be checked before
//! anything is parsed.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use tourbook::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = tourbook::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     tourbook::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.
pub mod api;
pub mod auth;
pub mod config;
pub mod db;
mod email;
pub mod errors;
mod images;
mod openapi;
pub mod payment_providers;
pub mod telemetry;
mod templates;
mod types;

#[cfg(test)]
pub mod test_utils;

use crate::{
    auth::password::{self, Argon2Params},
    config::CorsOrigin,
    db::handlers::Users,
    errors::{Error, InternalErrorDetail},
    openapi::ApiDoc,
    payment_providers::{PaymentProvider, create_provider},
};
use axum::{
    Json, Router,
    body::Body,
    extract::{DefaultBodyLimit, Request},
    http::{self, HeaderValue, Uri},
    middleware::{self, Next},
    response::Response,
    routing::{get, patch, post},
};
use bon::Builder;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use std::{str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument, warn};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use config::Config;
pub use types::{BookingId, ReviewId, TourId, UserId};

/// Application state shared across all request handlers.
///
/// - `db`: SQLite connection pool
/// - `config`: Application configuration loaded from file and environment
/// - `payments`: Checkout and webhook provider, absent when payments are not configured
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .db(pool)
///     .config(config)
///     .maybe_payments(provider)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Config,
    pub payments: Option<Arc<dyn PaymentProvider>>,
}

/// Get the tourbook database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Create the initial admin user, or promote and re-activate it if the email already exists.
///
/// When `password` is given it replaces the stored hash. A new admin without a password gets a
/// hash no password verifies against, so the account can only be used after a reset.
#[instrument(skip_all)]
pub async fn create_initial_admin_user(email: &str, password: Option<&str>, config: &Config, db: &SqlitePool) -> Result<UserId, Error> {
    let password_hash = match password {
        Some(pwd) => Some(password::hash_password(pwd.to_string(), Argon2Params::from(&config.auth.password)).await?),
        None => None,
    };

    let mut tx = db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let id = Users::new(&mut tx).upsert_admin(email, password_hash.as_deref()).await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    info!(admin_email = %email, "Initial admin user is ready");
    Ok(id)
}

/// Open the pool, run migrations and make sure the admin account exists.
async fn setup_database(config: &Config) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.database.url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect_with(options)
        .await?;

    migrator().run(&pool).await?;

    create_initial_admin_user(&config.admin_email, config.admin_password.as_deref(), config, &pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create initial admin user: {}", e))?;

    Ok(pool)
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors_config = &config.auth.security.cors;
    let allow_origin = if cors_config.allowed_origins.iter().any(|o| matches!(o, CorsOrigin::Wildcard)) {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in &cors_config.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                origins.push(url.as_str().trim_end_matches('/').parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            http::Method::GET,
            http::Method::POST,
            http::Method::PATCH,
            http::Method::DELETE,
        ])
        .allow_headers([http::header::AUTHORIZATION, http::header::CONTENT_TYPE])
        .allow_credentials(cors_config.allow_credentials)
        .expose_headers(vec![http::header::LOCATION]);

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

async fn route_not_found(uri: Uri) -> Error {
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or_else(|| uri.path());
    Error::not_found("route", path)
}

/// In development, copy the full error chain of a 5xx response into its JSON body as `error`.
async fn expose_error_details(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    let Some(InternalErrorDetail(detail)) = response.extensions().get::<InternalErrorDetail>().cloned() else {
        return response;
    };

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Failed to buffer error response: {e}");
            return Response::from_parts(parts, Body::empty());
        }
    };

    let mut value: serde_json::Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(_) => return Response::from_parts(parts, Body::from(bytes)),
    };
    if let Some(object) = value.as_object_mut() {
        object.insert("error".to_string(), serde_json::Value::String(detail));
    }

    parts.headers.remove(http::header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(value.to_string()))
}

/// Build the main application router with all endpoints and middleware.
///
/// - REST API under `/api/v1` with its OpenAPI document and docs page
/// - Payment webhook at `/webhook-checkout`
/// - Server-rendered pages
/// - Uploaded and static images under `/public`
/// - JSON body limit everywhere, a larger one on the upload routes
/// - 404 fallback, CORS and request tracing
///
/// # Errors
///
/// Returns an error if the CORS configuration is invalid.
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let upload_limit = DefaultBodyLimit::max(state.config.limits.upload_bytes);

    let user_routes = Router::new()
        .route("/signup", post(api::handlers::auth::signup))
        .route("/login", post(api::handlers::auth::login))
        .route("/logout", get(api::handlers::auth::logout))
        .route("/forgotPassword", post(api::handlers::auth::forgot_password))
        .route("/resetPassword/{token}", patch(api::handlers::auth::reset_password))
        .route("/updateMyPassword", patch(api::handlers::auth::update_my_password))
        .route("/me", get(api::handlers::users::get_me))
        .route("/updateMe", patch(api::handlers::users::update_me).layer(upload_limit))
        .route("/deleteMe", axum::routing::delete(api::handlers::users::delete_me))
        .route("/", get(api::handlers::users::list_users).post(api::handlers::users::create_user))
        .route(
            "/{id}",
            get(api::handlers::users::get_user)
                .patch(api::handlers::users::update_user)
                .delete(api::handlers::users::delete_user),
        );

    let tour_routes = Router::new()
        .route("/", get(api::handlers::tours::list_tours).post(api::handlers::tours::create_tour))
        .route("/top-5-cheap", get(api::handlers::tours::top_cheap_tours))
        .route("/tour-stats", get(api::handlers::tours::tour_stats))
        .route("/monthly-plan/{year}", get(api::handlers::tours::monthly_plan))
        .route(
            "/tours-within/{distance}/center/{latlng}/unit/{unit}",
            get(api::handlers::tours::tours_within),
        )
        .route("/distances/{latlng}/unit/{unit}", get(api::handlers::tours::tour_distances))
        .route(
            "/{id}",
            get(api::handlers::tours::get_tour)
                .patch(api::handlers::tours::update_tour)
                .delete(api::handlers::tours::delete_tour),
        )
        .route(
            "/{id}/reviews",
            get(api::handlers::reviews::list_tour_reviews).post(api::handlers::reviews::create_tour_review),
        )
        .route("/{id}/images", patch(api::handlers::tours::upload_tour_images).layer(upload_limit));

    let review_routes = Router::new()
        .route("/", get(api::handlers::reviews::list_reviews).post(api::handlers::reviews::create_review))
        .route(
            "/{id}",
            get(api::handlers::reviews::get_review)
                .patch(api::handlers::reviews::update_review)
                .delete(api::handlers::reviews::delete_review),
        );

    let booking_routes = Router::new()
        .route("/checkout-session/{tourId}", get(api::handlers::bookings::create_checkout_session))
        .route("/", get(api::handlers::bookings::list_bookings).post(api::handlers::bookings::create_booking))
        .route(
            "/{id}",
            get(api::handlers::bookings::get_booking)
                .patch(api::handlers::bookings::update_booking)
                .delete(api::handlers::bookings::delete_booking),
        );

    let api_routes = Router::new()
        .nest("/users", user_routes)
        .nest("/tours", tour_routes)
        .nest("/reviews", review_routes)
        .nest("/bookings", booking_routes)
        .route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }));

    let view_routes = Router::new()
        .route("/", get(api::handlers::views::overview))
        .route("/tour/{slug}", get(api::handlers::views::tour))
        .route("/login", get(api::handlers::views::login))
        .route("/me", get(api::handlers::views::account))
        .route("/my-tours", get(api::handlers::views::my_tours))
        .route("/submit-user-data", post(api::handlers::views::submit_user_data));

    let mut router = Router::new()
        // Raw body: the signature is checked before anything is parsed
        .route("/webhook-checkout", post(api::handlers::webhook::checkout_webhook))
        .nest("/api/v1", api_routes)
        .merge(view_routes)
        .with_state(state.clone())
        .merge(Scalar::with_url("/api/v1/docs", ApiDoc::openapi()))
        .nest_service("/public", ServeDir::new(&state.config.uploads.public_dir))
        .fallback(route_not_found)
        .layer(DefaultBodyLimit::max(state.config.limits.json_body_bytes));

    if state.config.is_development() {
        router = router.layer(middleware::from_fn(expose_error_details));
    }

    let cors_layer = create_cors_layer(&state.config)?;
    let router = router.layer(cors_layer).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// The HTTP server and the resources it owns.
///
/// 1. **Create**: [`Application::new`] opens the database, runs migrations, ensures the admin
///    account and builds the router
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and starts handling requests
/// 3. **Shutdown**: When the shutdown signal is received, closes the pool and flushes telemetry
pub struct Application {
    router: Router,
    config: Config,
    pool: SqlitePool,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting tourbook with configuration: {:#?}", config);

        let pool = setup_database(&config).await?;

        let payments = config.payment.clone().map(|payment| Arc::<dyn PaymentProvider>::from(create_provider(payment)));
        if payments.is_none() {
            warn!("No payment provider configured; checkout and the webhook are disabled");
        }

        let app_state = AppState::builder()
            .db(pool.clone())
            .config(config.clone())
            .maybe_payments(payments)
            .build();
        let router = build_router(app_state)?;

        Ok(Self { router, config, pool })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "Tourbook listening on http://{}, available at {}",
            bind_addr, self.config.base_url
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Closing database connections...");
        self.pool.close().await;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
