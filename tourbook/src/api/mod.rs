//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers for every endpoint and page
//! - **[`models`]**: Request/response data structures for API communication
//!
//! # API Structure
//!
//! - **Users** (`/api/v1/users/*`): signup, login, password flows, profile, administration
//! - **Tours** (`/api/v1/tours/*`): tour CRUD, geo queries, stats and monthly plan
//! - **Reviews** (`/api/v1/reviews/*`, `/api/v1/tours/{id}/reviews`)
//! - **Bookings** (`/api/v1/bookings/*`): checkout sessions and booking records
//! - **Webhook** (`/webhook-checkout`): payment provider callback
//! - **Pages** (`/`, `/tour/{slug}`, `/login`, `/me`, `/my-tours`)
//!
//! # OpenAPI Documentation
//!
//! REST endpoints are annotated with `utoipa`. The document is served at
//! `/api/v1/openapi.json` and browsable at `/api/v1/docs`.

pub mod handlers;
pub mod models;
