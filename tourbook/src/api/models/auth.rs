//! Response models for the session endpoints.

use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::users::UserResponse;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthData {
    pub user: UserResponse,
}

/// Body returned whenever a session is issued
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub status: String,
    pub token: String,
    pub data: AuthData,
}

impl AuthResponse {
    pub fn new(token: String, user: UserResponse) -> Self {
        Self {
            status: "success".to_string(),
            token,
            data: AuthData { user },
        }
    }
}

/// A fresh session: the body plus the cookie carrying the same token
pub struct SessionResponse {
    pub status: StatusCode,
    pub body: AuthResponse,
    pub cookie: String,
}

impl IntoResponse for SessionResponse {
    fn into_response(self) -> Response {
        (self.status, [(header::SET_COOKIE, self.cookie)], Json(self.body)).into_response()
    }
}

/// `{status, message}`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl MessageResponse {
    pub fn success(message: Option<&str>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.map(str::to_string),
        }
    }
}

/// Logout: replaces the session cookie with the sentinel
pub struct LogoutResponse {
    pub cookie: String,
}

impl IntoResponse for LogoutResponse {
    fn into_response(self) -> Response {
        ([(header::SET_COOKIE, self.cookie)], Json(MessageResponse::success(None))).into_response()
    }
}
