//! Authentication and authorization.
//!
//! Sessions are stateless JWTs carried either in an `Authorization: Bearer` header or in the
//! session cookie. Every authenticated request reloads the user so deactivation and password
//! changes take effect immediately.
//!
//! # Modules
//!
//! - [`current_user`]: the hard ([`CurrentUser`](crate::api::models::users::CurrentUser)) and soft
//!   ([`current_user::MaybeCurrentUser`]) extractors
//! - [`guard`]: role checks for handlers behind the hard chain
//! - [`password`]: Argon2 hashing and reset token generation
//! - [`session`]: token issue and verification
//!
//! # Usage in Handlers
//!
//! ```ignore
//! use tourbook::api::models::users::{CurrentUser, Role};
//! use tourbook::auth::guard::restrict_to;
//!
//! async fn create_tour(current_user: CurrentUser, State(state): State<AppState>) -> Result<..., Error> {
//!     restrict_to(&current_user, &[Role::Admin, Role::LeadGuide])?;
//!     ...
//! }
//! ```

pub mod current_user;
pub mod guard;
pub mod password;
pub mod session;
