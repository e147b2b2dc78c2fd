//! Extractors resolving the user behind a request.
//!
//! [`CurrentUser`] is the hard chain: any missing or bad credential rejects the request with a
//! 401. [`MaybeCurrentUser`] is the soft chain used by rendered pages: the same checks, but a
//! failure just means an anonymous visitor.

use crate::{
    AppState,
    api::models::users::CurrentUser,
    auth::session,
    config::Config,
    db::{
        errors::DbError,
        handlers::{Repository, Users},
    },
    errors::{Error, Result},
};
use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{header, request::Parts},
};
use tracing::{debug, instrument, trace};

/// Cookie value set on logout. Never a token.
pub const LOGGED_OUT: &str = "loggedout";

fn unauthenticated(message: &str) -> Error {
    Error::Unauthenticated {
        message: Some(message.to_string()),
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn cookie_token<'a>(parts: &'a Parts, cookie_name: &str) -> Option<&'a str> {
    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|cookie| cookie.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty() && *value != LOGGED_OUT)
}

/// The session token presented with a request: the bearer header wins over the cookie.
pub fn extract_token<'a>(parts: &'a Parts, config: &Config) -> Option<&'a str> {
    bearer_token(parts).or_else(|| cookie_token(parts, &config.auth.session.cookie_name))
}

/// Run the full chain: extract, verify, load the user, reject tokens older than a password change.
#[instrument(skip_all, err)]
async fn authenticate(parts: &Parts, state: &AppState) -> Result<CurrentUser> {
    let token = extract_token(parts, &state.config).ok_or_else(|| unauthenticated("You are not logged in! Please log in to get access."))?;
    let claims = session::verify_session_token(token, &state.config)?;

    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let user = Users::new(&mut conn)
        .get_by_id(claims.sub)
        .await?
        .ok_or_else(|| unauthenticated("The user belonging to this token does no longer exist."))?;

    if session::is_stale(claims.iat, user.password_changed_at) {
        return Err(unauthenticated("User recently changed password! Please log in again."));
    }

    debug!("Authenticated user {}", user.id);
    Ok(CurrentUser::from(user))
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(user.clone());
        }
        let user = authenticate(parts, state).await?;
        parts.extensions.insert(user.clone());
        Ok(user)
    }
}

/// Optional extraction (`Option<CurrentUser>`) behaves like the soft chain.
impl OptionalFromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Option<Self>> {
        Ok(MaybeCurrentUser::from_request_parts(parts, state).await?.0)
    }
}

/// The signed-in user when there is one. Never rejects.
#[derive(Debug, Clone, Default)]
pub struct MaybeCurrentUser(pub Option<CurrentUser>);

impl FromRequestParts<AppState> for MaybeCurrentUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        match <CurrentUser as FromRequestParts<AppState>>::from_request_parts(parts, state).await {
            Ok(user) => Ok(Self(Some(user))),
            Err(e) => {
                trace!("Treating request as anonymous: {}", e.user_message());
                Ok(Self(None))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::models::users::Role,
        auth::session::create_session_token,
        db::handlers::Users,
        test_utils::{create_test_state, create_test_user},
    };
    use axum::http::Request;
    use chrono::{Duration, Utc};
    use sqlx::SqlitePool;

    fn parts_with(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("http://localhost/api/v1/users/me");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    async fn extract(parts: &mut Parts, state: &AppState) -> Result<CurrentUser> {
        <CurrentUser as FromRequestParts<AppState>>::from_request_parts(parts, state).await
    }

    #[test]
    fn test_bearer_header_wins_over_cookie() {
        let config = crate::test_utils::create_test_config();
        let parts = parts_with(&[("authorization", "Bearer header-token"), ("cookie", "jwt=cookie-token")]);
        assert_eq!(extract_token(&parts, &config), Some("header-token"));

        let parts = parts_with(&[("cookie", "theme=dark; jwt=cookie-token")]);
        assert_eq!(extract_token(&parts, &config), Some("cookie-token"));

        let parts = parts_with(&[("cookie", "jwt=loggedout")]);
        assert_eq!(extract_token(&parts, &config), None);

        let parts = parts_with(&[("authorization", "Basic abc")]);
        assert_eq!(extract_token(&parts, &config), None);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_valid_token_yields_user(pool: SqlitePool) {
        let state = create_test_state(pool.clone());
        let user = create_test_user(&pool, Role::Guide).await;
        let token = create_session_token(user.id, &state.config).unwrap();

        let mut parts = parts_with(&[("authorization", format!("Bearer {token}").as_str())]);
        let current = extract(&mut parts, &state).await.unwrap();
        assert_eq!(current.id, user.id);
        assert_eq!(current.role, Role::Guide);

        let mut parts = parts_with(&[("cookie", format!("jwt={token}").as_str())]);
        assert_eq!(extract(&mut parts, &state).await.unwrap().id, user.id);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_missing_token(pool: SqlitePool) {
        let state = create_test_state(pool);
        let mut parts = parts_with(&[]);
        let err = extract(&mut parts, &state).await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::UNAUTHORIZED);
        assert_eq!(err.user_message(), "You are not logged in! Please log in to get access.");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_invalid_token(pool: SqlitePool) {
        let state = create_test_state(pool);
        let mut parts = parts_with(&[("authorization", "Bearer not.a.jwt")]);
        let err = extract(&mut parts, &state).await.unwrap_err();
        assert_eq!(err.user_message(), "Invalid token. Please log in again!");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_deactivated_user_is_rejected(pool: SqlitePool) {
        let state = create_test_state(pool.clone());
        let user = create_test_user(&pool, Role::User).await;
        let token = create_session_token(user.id, &state.config).unwrap();

        let mut conn = pool.acquire().await.unwrap();
        assert!(Users::new(&mut conn).deactivate(user.id).await.unwrap());

        let mut parts = parts_with(&[("authorization", format!("Bearer {token}").as_str())]);
        let err = extract(&mut parts, &state).await.unwrap_err();
        assert_eq!(err.user_message(), "The user belonging to this token does no longer exist.");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_token_older_than_password_change(pool: SqlitePool) {
        let state = create_test_state(pool.clone());
        let user = create_test_user(&pool, Role::User).await;
        let token = create_session_token(user.id, &state.config).unwrap();

        let mut conn = pool.acquire().await.unwrap();
        Users::new(&mut conn)
            .set_password(user.id, &user.password_hash, Utc::now() + Duration::seconds(5))
            .await
            .unwrap();

        let mut parts = parts_with(&[("authorization", format!("Bearer {token}").as_str())]);
        let err = extract(&mut parts, &state).await.unwrap_err();
        assert_eq!(err.user_message(), "User recently changed password! Please log in again.");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_soft_chain_never_fails(pool: SqlitePool) {
        let state = create_test_state(pool.clone());

        for headers in [vec![], vec![("authorization", "Bearer garbage")], vec![("cookie", "jwt=loggedout")]] {
            let mut parts = parts_with(&headers);
            let MaybeCurrentUser(user) = MaybeCurrentUser::from_request_parts(&mut parts, &state).await.unwrap();
            assert!(user.is_none());
        }

        let user = create_test_user(&pool, Role::User).await;
        let token = create_session_token(user.id, &state.config).unwrap();
        let mut parts = parts_with(&[("cookie", format!("jwt={token}").as_str())]);
        let MaybeCurrentUser(current) = MaybeCurrentUser::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(current.map(|u| u.id), Some(user.id));
    }
}
