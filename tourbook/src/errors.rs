use crate::db::errors::DbError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error as ThisError;
use utoipa::ToSchema;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Request payload failed entity validation
    #[error("Invalid input data: {errors:?}")]
    Validation { errors: Vec<FieldError> },

    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    /// Authentication required but not provided, invalid, or stale
    #[error("Not authenticated")]
    Unauthenticated { message: Option<String> },

    /// Authenticated user is not allowed to perform the action
    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// Conflict error, e.g. for unique constraint violations detected up front
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// Outbound mail could not be delivered
    #[error("Delivery failed: {message}")]
    Delivery { message: String },

    /// An upstream provider (payments) failed or rejected the call
    #[error("Upstream error: {message}")]
    Upstream { message: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Full error chain attached to 5xx responses, surfaced only in development.
#[derive(Debug, Clone)]
pub struct InternalErrorDetail(pub String);

impl Error {
    pub fn not_found(resource: &str, id: impl ToString) -> Self {
        Error::NotFound {
            resource: resource.to_string(),
            id: id.to_string(),
        }
    }

    /// A list page past the last matching document.
    pub fn page_not_found(page: i64) -> Self {
        Self::not_found("page", page)
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation { .. } | Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Error::Forbidden { .. } => StatusCode::FORBIDDEN,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Conflict { .. } => StatusCode::CONFLICT,
            Error::Delivery { .. } | Error::Internal { .. } | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Upstream { .. } => StatusCode::BAD_GATEWAY,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                DbError::ForeignKeyViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::CheckViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Validation { errors } => {
                let joined: Vec<&str> = errors.iter().map(|e| e.message.as_str()).collect();
                format!("Invalid input data. {}", joined.join(". "))
            }
            Error::BadRequest { message } => message.clone(),
            Error::Unauthenticated { message } => message.clone().unwrap_or_else(|| "Authentication required".to_string()),
            Error::Forbidden { message } => message.clone(),
            Error::NotFound { resource, .. } if resource == "page" => "This page does not exist.".to_string(),
            Error::NotFound { resource, .. } if resource == "email" => "There is no user with that email address.".to_string(),
            Error::NotFound { resource, .. } if resource == "slug" => "There is no tour with that name.".to_string(),
            Error::NotFound { resource, id } if resource == "route" => format!("Can't find {id} on this server!"),
            Error::NotFound { .. } => "No document found with that ID".to_string(),
            Error::Conflict { message } => message.clone(),
            Error::Delivery { message } => message.clone(),
            Error::Upstream { .. } => "Payment provider is unavailable. Try again later!".to_string(),
            Error::Internal { .. } | Error::Other(_) => "Something went very wrong!".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "No document found with that ID".to_string(),
                DbError::UniqueViolation { table, columns, .. } => match (table.as_deref(), columns.as_slice()) {
                    (Some("reviews"), _) => "You have already reviewed this tour.".to_string(),
                    (Some("users"), [column]) if column == "email" => "An account with this email address already exists".to_string(),
                    (Some("tours"), [column]) if column == "name" => "A tour with this name already exists".to_string(),
                    (Some("bookings"), _) => "This checkout session has already been booked".to_string(),
                    _ => "Duplicate field value: please use another value!".to_string(),
                },
                DbError::ForeignKeyViolation { .. } => "Invalid reference to related resource".to_string(),
                DbError::CheckViolation { .. } => "Invalid data provided".to_string(),
                DbError::Other(_) => "Something went very wrong!".to_string(),
            },
        }
    }

    /// Envelope status: "fail" for client errors, "error" for server errors.
    pub fn status_label(&self) -> &'static str {
        if self.status_code().is_client_error() { "fail" } else { "error" }
    }

    /// Log at a level matching the error class.
    pub fn log(&self) {
        match self {
            Error::Database(DbError::Other(_)) | Error::Internal { .. } | Error::Other(_) | Error::Delivery { .. } | Error::Upstream { .. } => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Database(_) | Error::Conflict { .. } => {
                tracing::warn!("Database constraint error: {}", self);
            }
            Error::Unauthenticated { .. } | Error::Forbidden { .. } => {
                tracing::info!("Authorization error: {}", self);
            }
            Error::Validation { .. } | Error::BadRequest { .. } | Error::NotFound { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        self.log();

        let status = self.status_code();
        let mut body = json!({
            "status": self.status_label(),
            "message": self.user_message(),
        });
        if let Error::Validation { errors } = &self {
            body["errors"] = json!(errors);
        }

        let mut response = (status, axum::response::Json(body)).into_response();
        if status.is_server_error() {
            response.extensions_mut().insert(InternalErrorDetail(format!("{self:#}")));
        }
        response
    }
}

/// Convert from String errors (e.g., from external functions)
impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Internal { operation: msg }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
