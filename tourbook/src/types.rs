//! Common type definitions.
//!
//! All entity IDs are UUIDs wrapped in type aliases so signatures say which
//! entity they expect:
//!
//! - [`UserId`]: user account identifier
//! - [`TourId`]: tour identifier
//! - [`ReviewId`]: review identifier
//! - [`BookingId`]: booking identifier

use uuid::Uuid;

// Type aliases for IDs
pub type UserId = Uuid;
pub type TourId = Uuid;
pub type ReviewId = Uuid;
pub type BookingId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}
