//! Repository implementations for database access.
//!
//! Each repository wraps a SQLx connection or transaction and implements the [`Repository`]
//! trait, which the generic resource handlers are written against. List operations take a
//! [`ListFilter`] parsed from the request query against the repository's schema.
//!
//! # Available Repositories
//!
//! - [`Users`]: accounts, password changes and reset tokens
//! - [`Tours`]: tours with their guides; secret tours are never returned
//! - [`Reviews`]: reviews and the tour rating aggregate they drive
//! - [`Bookings`]: manual and checkout-created bookings
//! - [`analytics`]: tour statistics, the monthly plan and geospatial queries

pub mod analytics;
pub mod bookings;
pub mod listing;
pub mod repository;
pub mod reviews;
pub mod tours;
pub mod users;

pub use bookings::Bookings;
pub use listing::{EntitySchema, ListFilter};
pub use repository::Repository;
pub use reviews::Reviews;
pub use tours::Tours;
pub use users::Users;
