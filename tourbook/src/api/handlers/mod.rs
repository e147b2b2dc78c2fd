//! HTTP request handlers, organized by resource.
//!
//! Each handler validates and deserializes its input, authorizes through the
//! [`CurrentUser`](crate::api::models::users::CurrentUser) extractor and
//! [`restrict_to`](crate::auth::guard::restrict_to), does its work through a repository from
//! [`crate::db::handlers`], and returns the JSON envelope. Errors are
//! [`crate::errors::Error`], rendered by its `IntoResponse` impl.
//!
//! # Handler Modules
//!
//! - [`auth`]: signup, login, logout and the password flows
//! - [`users`]: the signed-in user's profile and admin user management
//! - [`tours`]: tour CRUD, image upload, geo queries and analytics
//! - [`reviews`]: reviews, top-level and nested under a tour
//! - [`bookings`]: checkout sessions and staff booking management
//! - [`webhook`]: the signed payment provider callback
//! - [`views`]: server-rendered pages
//! - [`factory`]: the generic CRUD operations the resource modules share

pub mod auth;
pub mod bookings;
pub mod factory;
pub mod reviews;
pub mod tours;
pub mod users;
pub mod views;
pub mod webhook;
