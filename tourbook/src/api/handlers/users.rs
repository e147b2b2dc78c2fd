use axum::{
    Json,
    extract::{FromRequest, Multipart, Path, Query, Request, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::{
    AppState,
    api::{
        handlers::factory::{self, Document, DocumentList},
        models::{
            pagination::ListQuery,
            users::{CurrentUser, Role, UpdateMeRequest, UserResponse, UserUpdate, normalize_email, validate_identity},
            validation::into_result,
        },
    },
    auth::guard::restrict_to,
    db::{
        handlers::{ListFilter, Repository, Users, users::USER_SCHEMA},
        models::users::UserUpdateDBRequest,
    },
    errors::{Error, Result},
    images,
    types::UserId,
};

/// A photo pulled out of a multipart body
struct Upload {
    content_type: Option<String>,
    bytes: Vec<u8>,
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> Error {
    Error::BadRequest { message: e.body_text() }
}

/// Read `updateMe` input from either a JSON body or a multipart form with an optional `photo`.
async fn read_update_me(request: Request, state: &AppState) -> Result<(UpdateMeRequest, Option<Upload>)> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    if !is_multipart {
        let Json(update) = Json::<UpdateMeRequest>::from_request(request, state)
            .await
            .map_err(|e| Error::BadRequest { message: e.body_text() })?;
        return Ok((update, None));
    }

    let mut multipart = Multipart::from_request(request, state)
        .await
        .map_err(|e| Error::BadRequest { message: e.body_text() })?;
    let mut update = UpdateMeRequest::default();
    let mut photo = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name().unwrap_or_default() {
            "photo" => {
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(multipart_error)?;
                if !bytes.is_empty() {
                    photo = Some(Upload {
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            "name" => update.name = Some(field.text().await.map_err(multipart_error)?),
            "email" => update.email = Some(field.text().await.map_err(multipart_error)?),
            "password" => update.password = Some(field.text().await.map_err(multipart_error)?),
            "passwordConfirm" => update.password_confirm = Some(field.text().await.map_err(multipart_error)?),
            other => tracing::debug!(field = other, "Ignoring multipart field"),
        }
    }

    Ok((update, photo))
}

/// Get the signed-in user's account
#[utoipa::path(
    get,
    path = "/users/me",
    tag = "users",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Not logged in"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_me(State(state): State<AppState>, current_user: CurrentUser) -> Result<Document<UserResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    factory::get_one(&mut Users::new(&mut conn), current_user.id, "user").await
}

/// Update the signed-in user's name, email or photo
#[utoipa::path(
    patch,
    path = "/users/updateMe",
    request_body(content = UpdateMeRequest, description = "JSON, or multipart/form-data with an optional `photo` file"),
    tag = "users",
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 400, description = "Invalid input, or a password field was sent"),
        (status = 401, description = "Not logged in"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_me(State(state): State<AppState>, current_user: CurrentUser, request: Request) -> Result<Document<UserResponse>> {
    let (update, photo) = read_update_me(request, &state).await?;

    if update.password.is_some() || update.password_confirm.is_some() {
        return Err(Error::BadRequest {
            message: "This route is not for password updates. Please use /updateMyPassword.".to_string(),
        });
    }
    into_result(validate_identity(update.name.as_deref(), update.email.as_deref(), false))?;

    let photo = match photo {
        Some(upload) => {
            images::ensure_image(upload.content_type.as_deref())?;
            Some(images::save_user_photo(&state.config.uploads.public_dir, current_user.id, upload.bytes).await?)
        }
        None => None,
    };

    // Only these fields may change here; the role stays as it is
    let request = UserUpdateDBRequest {
        name: update.name.map(|n| n.trim().to_string()),
        email: update.email.as_deref().and_then(normalize_email),
        photo,
        role: None,
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let user = Users::new(&mut conn).update(current_user.id, &request).await?;
    Ok(Document::ok(UserResponse::from(user)))
}

/// Deactivate the signed-in user's account
#[utoipa::path(
    delete,
    path = "/users/deleteMe",
    tag = "users",
    responses(
        (status = 204, description = "Account deactivated"),
        (status = 401, description = "Not logged in"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn delete_me(State(state): State<AppState>, current_user: CurrentUser) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    Users::new(&mut conn).deactivate(current_user.id).await?;
    tracing::info!(user_id = %current_user.id, "Account deactivated");
    Ok(StatusCode::NO_CONTENT)
}

/// Accounts are created through signup only
#[utoipa::path(
    post,
    path = "/users",
    tag = "users",
    responses(
        (status = 500, description = "Always: use /signup"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_user() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "status": "error",
            "message": "This route is not defined! Please use /signup instead",
        })),
    )
        .into_response()
}

/// List users (admin)
#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    params(ListQuery),
    responses(
        (status = 200, description = "A page of users", body = Vec<UserResponse>),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "Page past the last user"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<DocumentList> {
    restrict_to(&current_user, &[Role::Admin])?;
    let filter = ListFilter::from_query(&USER_SCHEMA, &params)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    factory::get_all::<_, UserResponse>(&mut Users::new(&mut conn), &filter).await
}

/// Get a user (admin)
#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "users",
    params(("id" = uuid::Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "The user", body = UserResponse),
        (status = 404, description = "No such user"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_user(State(state): State<AppState>, current_user: CurrentUser, Path(id): Path<UserId>) -> Result<Document<UserResponse>> {
    restrict_to(&current_user, &[Role::Admin])?;
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    factory::get_one(&mut Users::new(&mut conn), id, "user").await
}

/// Update a user (admin)
#[utoipa::path(
    patch,
    path = "/users/{id}",
    tag = "users",
    request_body = UserUpdate,
    params(("id" = uuid::Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 400, description = "Invalid input"),
        (status = 404, description = "No such user"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_user(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<UserId>,
    Json(update): Json<UserUpdate>,
) -> Result<Document<UserResponse>> {
    restrict_to(&current_user, &[Role::Admin])?;
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    factory::update_one(&mut Users::new(&mut conn), id, update, "user").await
}

/// Delete a user and everything they own (admin)
#[utoipa::path(
    delete,
    path = "/users/{id}",
    tag = "users",
    params(("id" = uuid::Uuid, Path, description = "User ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "No such user"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn delete_user(State(state): State<AppState>, current_user: CurrentUser, Path(id): Path<UserId>) -> Result<StatusCode> {
    restrict_to(&current_user, &[Role::Admin])?;
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    factory::delete_one(&mut Users::new(&mut conn), id, "user").await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{auth_header, create_test_app, create_test_app_with, create_test_config, create_test_state_with, create_test_user};
    use axum_test::multipart::{MultipartForm, Part};
    use serde_json::Value;
    use sqlx::SqlitePool;

    fn png() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(32, 32, image::Rgb([200, 30, 30]));
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_me_rejects_password(pool: SqlitePool) {
        let user = create_test_user(&pool, Role::User).await;
        let (name, value) = auth_header(user.id, &create_test_config());
        let server = create_test_app(pool);

        let response = server
            .patch("/api/v1/users/updateMe")
            .add_header(name.clone(), value.clone())
            .json(&json!({ "password": "new-password" }))
            .await;
        response.assert_status_bad_request();
        assert_eq!(
            response.json::<Value>()["message"],
            "This route is not for password updates. Please use /updateMyPassword."
        );

        let response = server
            .patch("/api/v1/users/updateMe")
            .add_header(name, value)
            .json(&json!({ "name": "Renamed Person", "role": "admin" }))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["data"]["data"]["name"], "Renamed Person");
        assert_eq!(body["data"]["data"]["role"], "user");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_me_with_photo(pool: SqlitePool) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = create_test_config();
        config.uploads.public_dir = dir.path().to_path_buf();
        let user = create_test_user(&pool, Role::User).await;
        let (name, value) = auth_header(user.id, &config);
        let server = create_test_app_with(create_test_state_with(pool, config, None));

        let form = MultipartForm::new()
            .add_text("name", "Photo Person")
            .add_part("photo", Part::bytes(png()).file_name("me.png").mime_type("image/png"));
        let response = server.patch("/api/v1/users/updateMe").add_header(name.clone(), value.clone()).multipart(form).await;
        response.assert_status_ok();

        let body: Value = response.json();
        let photo = body["data"]["data"]["photo"].as_str().unwrap().to_string();
        assert!(photo.starts_with(&format!("user-{}-", user.id)));
        assert!(dir.path().join("img/users").join(&photo).exists());

        let form = MultipartForm::new().add_part("photo", Part::bytes(b"plain text".to_vec()).file_name("notes.txt").mime_type("text/plain"));
        let response = server.patch("/api/v1/users/updateMe").add_header(name, value).multipart(form).await;
        response.assert_status_bad_request();
        assert_eq!(response.json::<Value>()["message"], "Not an image! Please upload only images.");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_delete_me_deactivates(pool: SqlitePool) {
        let user = create_test_user(&pool, Role::User).await;
        let (name, value) = auth_header(user.id, &create_test_config());
        let server = create_test_app(pool);

        server
            .delete("/api/v1/users/deleteMe")
            .add_header(name.clone(), value.clone())
            .await
            .assert_status(StatusCode::NO_CONTENT);

        let response = server.get("/api/v1/users/me").add_header(name, value).await;
        response.assert_status_unauthorized();
        assert_eq!(response.json::<Value>()["message"], "The user belonging to this token does no longer exist.");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_user_points_to_signup(pool: SqlitePool) {
        let server = create_test_app(pool);
        let response = server.post("/api/v1/users").json(&json!({})).await;
        response.assert_status_internal_server_error();
        let body: Value = response.json();
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "This route is not defined! Please use /signup instead");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_admin_only_user_management(pool: SqlitePool) {
        let admin = create_test_user(&pool, Role::Admin).await;
        let user = create_test_user(&pool, Role::User).await;
        let config = create_test_config();
        let server = create_test_app(pool);

        let (name, value) = auth_header(user.id, &config);
        let response = server.get("/api/v1/users").add_header(name, value).await;
        response.assert_status_forbidden();
        assert_eq!(response.json::<Value>()["message"], "You do not have permission to perform this action");

        let (name, value) = auth_header(admin.id, &config);
        let response = server.get("/api/v1/users").add_header(name.clone(), value.clone()).await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["results"], 2);

        let response = server
            .patch(&format!("/api/v1/users/{}", user.id))
            .add_header(name.clone(), value.clone())
            .json(&json!({ "role": "guide" }))
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["data"]["data"]["role"], "guide");

        server
            .delete(&format!("/api/v1/users/{}", user.id))
            .add_header(name.clone(), value.clone())
            .await
            .assert_status(StatusCode::NO_CONTENT);
        server
            .get(&format!("/api/v1/users/{}", user.id))
            .add_header(name, value)
            .await
            .assert_status_not_found();
    }
}
