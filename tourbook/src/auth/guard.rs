//! Role based access checks, applied after the user has been authenticated.

use crate::{
    api::models::users::{CurrentUser, Role},
    errors::{Error, Result},
};

/// Allow the request only when the user holds one of `allowed`.
pub fn restrict_to(user: &CurrentUser, allowed: &[Role]) -> Result<()> {
    if allowed.contains(&user.role) {
        Ok(())
    } else {
        tracing::debug!(user_id = %user.id, role = user.role.as_str(), "Role not permitted");
        Err(Error::Forbidden {
            message: "You do not have permission to perform this action".to_string(),
        })
    }
}
