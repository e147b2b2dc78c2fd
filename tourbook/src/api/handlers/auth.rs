use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{Duration, Utc};

use crate::{
    AppState,
    api::models::{
        auth::{AuthResponse, LogoutResponse, MessageResponse, SessionResponse},
        users::{
            CurrentUser, ForgotPasswordRequest, LoginRequest, ResetPasswordRequest, Role, SignupRequest, UpdatePasswordRequest, UserResponse,
            normalize_email, validate_identity,
        },
        validation::{into_result, validate_password},
    },
    auth::{
        current_user::LOGGED_OUT,
        password::{self, Argon2Params},
        session,
    },
    config::Config,
    db::{
        handlers::{Repository, Users},
        models::users::{UserCreateDBRequest, UserDBResponse},
    },
    email::{EmailService, Recipient},
    errors::Error,
};

/// `Set-Cookie` value carrying a session token.
pub fn session_cookie(token: &str, config: &Config) -> String {
    let session_config = &config.auth.session;
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite={}; Max-Age={}",
        session_config.cookie_name,
        token,
        session_config.cookie_same_site,
        session_config.timeout.as_secs()
    );
    if session_config.cookie_secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value replacing the session with the logged-out sentinel for ten seconds.
pub fn logged_out_cookie(config: &Config) -> String {
    let session_config = &config.auth.session;
    format!(
        "{}={}; Path=/; HttpOnly; SameSite={}; Max-Age=10",
        session_config.cookie_name, LOGGED_OUT, session_config.cookie_same_site
    )
}

fn issue_session(user: UserDBResponse, status: StatusCode, config: &Config) -> Result<SessionResponse, Error> {
    let token = session::create_session_token(user.id, config)?;
    let cookie = session_cookie(&token, config);
    Ok(SessionResponse {
        status,
        body: AuthResponse::new(token, UserResponse::from(user)),
        cookie,
    })
}

fn check_password(password: Option<&str>, confirm: Option<&str>, config: &Config) -> Result<(), Error> {
    let rules = &config.auth.password;
    into_result(validate_password(password, confirm, rules.min_length, rules.max_length))
}

/// Sign up a new account with the `user` role
#[utoipa::path(
    post,
    path = "/users/signup",
    request_body = SignupRequest,
    tag = "authentication",
    responses(
        (status = 201, description = "Account created and signed in", body = AuthResponse),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Email already registered"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn signup(State(state): State<AppState>, Json(request): Json<SignupRequest>) -> Result<SessionResponse, Error> {
    let mut errors = validate_identity(request.name.as_deref(), request.email.as_deref(), true);
    errors.extend(validate_password(
        request.password.as_deref(),
        request.password_confirm.as_deref(),
        state.config.auth.password.min_length,
        state.config.auth.password.max_length,
    ));
    into_result(errors)?;

    let email = request.email.as_deref().and_then(normalize_email).unwrap_or_default();
    let password_hash = password::hash_password(request.password.unwrap_or_default(), Argon2Params::from(&state.config.auth.password)).await?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let user = Users::new(&mut conn)
        .create(&UserCreateDBRequest {
            name: request.name.unwrap_or_default().trim().to_string(),
            email,
            photo: None,
            role: Role::User,
            password_hash,
        })
        .await?;
    tracing::info!(user_id = %user.id, "New account signed up");

    // A failed welcome email does not undo the signup
    let account_url = format!("{}/me", state.config.base_url);
    let recipient = Recipient {
        name: &user.name,
        email: &user.email,
    };
    match EmailService::new(&state.config) {
        Ok(service) => {
            if let Err(e) = service.send_welcome(recipient, &account_url).await {
                tracing::warn!("Failed to send welcome email: {e}");
            }
        }
        Err(e) => tracing::warn!("Email service unavailable: {e}"),
    }

    issue_session(user, StatusCode::CREATED, &state.config)
}

/// Log in with email and password
#[utoipa::path(
    post,
    path = "/users/login",
    request_body = LoginRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Email or password missing"),
        (status = 401, description = "Invalid credentials"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn login(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> Result<SessionResponse, Error> {
    let (Some(email), Some(password)) = (request.email.filter(|e| !e.is_empty()), request.password.filter(|p| !p.is_empty())) else {
        return Err(Error::BadRequest {
            message: "Please provide email and password!".to_string(),
        });
    };

    let invalid = || Error::Unauthenticated {
        message: Some("Incorrect email or password".to_string()),
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let user = Users::new(&mut conn).get_user_by_email(&email).await?.ok_or_else(invalid)?;

    if !password::verify_password(password, user.password_hash.clone()).await? {
        return Err(invalid());
    }

    issue_session(user, StatusCode::OK, &state.config)
}

/// Log out by overwriting the session cookie
#[utoipa::path(
    get,
    path = "/users/logout",
    tag = "authentication",
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn logout(State(state): State<AppState>) -> LogoutResponse {
    LogoutResponse {
        cookie: logged_out_cookie(&state.config),
    }
}

/// Email a password reset link
#[utoipa::path(
    post,
    path = "/users/forgotPassword",
    request_body = ForgotPasswordRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Reset link sent", body = MessageResponse),
        (status = 404, description = "No user with that email"),
        (status = 500, description = "The email could not be sent"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn forgot_password(State(state): State<AppState>, Json(request): Json<ForgotPasswordRequest>) -> Result<Json<MessageResponse>, Error> {
    let email = request.email.unwrap_or_default();
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut users = Users::new(&mut conn);

    let user = users.get_user_by_email(&email).await?.ok_or_else(|| Error::not_found("email", &email))?;

    let token = password::generate_reset_token();
    let expires_at = Utc::now() + state.config.auth.password_reset_token_duration;
    users
        .set_password_reset(user.id, Some(&password::digest_reset_token(&token)), Some(expires_at))
        .await?;

    let reset_url = format!("{}/api/v1/users/resetPassword/{}", state.config.base_url, token);
    let recipient = Recipient {
        name: &user.name,
        email: &user.email,
    };
    let sent = match EmailService::new(&state.config) {
        Ok(service) => service.send_password_reset(recipient, &reset_url).await,
        Err(e) => Err(e),
    };

    if let Err(e) = sent {
        tracing::error!(user_id = %user.id, "Failed to send password reset email: {e}");
        users.set_password_reset(user.id, None, None).await?;
        return Err(Error::Delivery {
            message: "There was an error sending the email. Try again later!".to_string(),
        });
    }

    Ok(Json(MessageResponse::success(Some("Token sent to email!"))))
}

/// Set a new password with a reset token
#[utoipa::path(
    patch,
    path = "/users/resetPassword/{token}",
    request_body = ResetPasswordRequest,
    tag = "authentication",
    params(("token" = String, Path, description = "Token from the reset email")),
    responses(
        (status = 200, description = "Password reset, signed in", body = AuthResponse),
        (status = 400, description = "Token invalid or expired, or password rejected"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<SessionResponse, Error> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut users = Users::new(&mut conn);

    let pending = users
        .find_by_reset_token(&password::digest_reset_token(&token))
        .await?
        .filter(|pending| pending.expires_at > Utc::now())
        .ok_or_else(|| Error::BadRequest {
            message: "Token is invalid or has expired".to_string(),
        })?;

    check_password(request.password.as_deref(), request.password_confirm.as_deref(), &state.config)?;
    let password_hash = password::hash_password(request.password.unwrap_or_default(), Argon2Params::from(&state.config.auth.password)).await?;

    // Backdated so the session issued below is not already stale
    let user = users
        .set_password(pending.user.id, &password_hash, Utc::now() - Duration::seconds(1))
        .await?;
    tracing::info!(user_id = %user.id, "Password reset");

    issue_session(user, StatusCode::OK, &state.config)
}

/// Change the signed-in user's password
#[utoipa::path(
    patch,
    path = "/users/updateMyPassword",
    request_body = UpdatePasswordRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Password changed, new session issued", body = AuthResponse),
        (status = 400, description = "New password rejected"),
        (status = 401, description = "Current password is wrong"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_my_password(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<UpdatePasswordRequest>,
) -> Result<SessionResponse, Error> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut users = Users::new(&mut conn);

    let user = users
        .get_by_id(current_user.id)
        .await?
        .ok_or_else(|| Error::not_found("user", current_user.id))?;

    let current_password = request.password_current.unwrap_or_default();
    if !password::verify_password(current_password, user.password_hash).await? {
        return Err(Error::Unauthenticated {
            message: Some("Your current password is wrong.".to_string()),
        });
    }

    check_password(request.password.as_deref(), request.password_confirm.as_deref(), &state.config)?;
    let password_hash = password::hash_password(request.password.unwrap_or_default(), Argon2Params::from(&state.config.auth.password)).await?;
    let user = users.set_password(user.id, &password_hash, Utc::now() - Duration::seconds(1)).await?;

    issue_session(user, StatusCode::OK, &state.config)
}
