//! Request validation shared by the generic resource handlers.

use crate::errors::{Error, FieldError};

/// Checks a create payload against the entity's rules and turns it into the storage request.
pub trait Validate: Sized {
    type Valid;

    fn validate(self) -> Result<Self::Valid, Vec<FieldError>>;
}

/// Checks a partial update against the entity it would be merged into.
pub trait ValidatePatch<Current>: Sized {
    type Valid;

    fn validate_patch(self, current: &Current) -> Result<Self::Valid, Vec<FieldError>>;
}

/// Turn collected field errors into a single 400.
pub fn into_result(errors: Vec<FieldError>) -> Result<(), Error> {
    if errors.is_empty() { Ok(()) } else { Err(Error::Validation { errors }) }
}

/// Passwords must fall within the configured length bounds and match their confirmation.
pub fn validate_password(password: Option<&str>, confirm: Option<&str>, min_length: usize, max_length: usize) -> Vec<FieldError> {
    let mut errors = Vec::new();
    match password {
        None | Some("") => errors.push(FieldError::new("password", "Please provide a password")),
        Some(p) if p.chars().count() < min_length => {
            errors.push(FieldError::new("password", format!("Password must be at least {min_length} characters")))
        }
        Some(p) if p.chars().count() > max_length => {
            errors.push(FieldError::new("password", format!("Password must be at most {max_length} characters")))
        }
        Some(_) => {}
    }
    match confirm {
        None | Some("") => errors.push(FieldError::new("passwordConfirm", "Please confirm your password")),
        Some(c) if Some(c) != password => errors.push(FieldError::new("passwordConfirm", "Passwords are not the same!")),
        Some(_) => {}
    }
    errors
}
