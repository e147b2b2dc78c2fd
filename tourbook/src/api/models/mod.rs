//! API request and response models.
//!
//! Request types deserialize untrusted input with every field optional and are turned into
//! database requests through [`validation::Validate`] / [`validation::ValidatePatch`]; response
//! types are the camelCase shapes returned to clients.

pub mod auth;
pub mod bookings;
pub mod pagination;
pub mod reviews;
pub mod tours;
pub mod users;
pub mod validation;
