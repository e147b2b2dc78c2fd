//! Database repository for users.

use crate::auth::password::UNUSABLE_HASH;
use crate::types::{UserId, abbrev_uuid};
use crate::{
    api::models::users::Role,
    db::{
        errors::{DbError, Result},
        handlers::{
            listing::{EntitySchema, FieldKind, FieldSpec, ListFilter},
            repository::Repository,
        },
        models::users::{PasswordResetDBResponse, UserCreateDBRequest, UserDBResponse, UserUpdateDBRequest},
    },
};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection};
use tracing::instrument;
use uuid::Uuid;

/// Fields an admin may filter and sort the user list on
pub const USER_SCHEMA: EntitySchema = EntitySchema {
    table: "users",
    fields: &[
        FieldSpec::new("id", "users.id", FieldKind::Id),
        FieldSpec::new("name", "users.name", FieldKind::Text),
        FieldSpec::new("email", "users.email", FieldKind::Text),
        FieldSpec::new("role", "users.role", FieldKind::Text),
        FieldSpec::new("createdAt", "users.created_at", FieldKind::Timestamp),
    ],
};

// Database entity model
#[derive(Debug, Clone, FromRow)]
struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub photo: String,
    pub role: Role,
    pub password_hash: String,
    pub password_changed_at: Option<DateTime<Utc>>,
    pub password_reset_token: Option<String>,
    pub password_reset_expires: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserDBResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            photo: user.photo,
            role: user.role,
            password_hash: user.password_hash,
            password_changed_at: user.password_changed_at,
            active: user.active,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

pub struct Users<'c> {
    db: &'c mut SqliteConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Users<'c> {
    type CreateRequest = UserCreateDBRequest;
    type UpdateRequest = UserUpdateDBRequest;
    type Response = UserDBResponse;
    type Id = UserId;
    type Filter = ListFilter;

    #[instrument(skip(self, request), fields(email = %request.email), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        // Always generate a new ID for users
        let user_id = Uuid::new_v4();
        let now = Utc::now();

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, name, email, photo, role, password_hash, active, created_at, updated_at)
            VALUES (?, ?, ?, COALESCE(?, 'default.jpg'), ?, ?, 1, ?, ?)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(&request.name)
        .bind(&request.email)
        .bind(&request.photo)
        .bind(request.role)
        .bind(&request.password_hash)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(user.into())
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ? AND active = 1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user.map(Into::into))
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, page = filter.page), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM users WHERE active = 1");
        filter.push_conditions(&mut query);
        filter.push_order_and_page(&USER_SCHEMA, &mut query);

        let users = query.build_query_as::<User>().fetch_all(&mut *self.db).await?;
        Ok(users.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, filter), err)]
    async fn count(&mut self, filter: &Self::Filter) -> Result<i64> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM users WHERE active = 1");
        filter.push_conditions(&mut query);

        Ok(query.build_query_scalar::<i64>().fetch_one(&mut *self.db).await?)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?").bind(id).execute(&mut *self.db).await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                name = COALESCE(?, name),
                email = COALESCE(?, email),
                photo = COALESCE(?, photo),
                role = COALESCE(?, role),
                updated_at = ?
            WHERE id = ? AND active = 1
            RETURNING *
            "#,
        )
        .bind(&request.name)
        .bind(&request.email)
        .bind(&request.photo)
        .bind(request.role)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(user.into())
    }
}

impl<'c> Users<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, email), err)]
    pub async fn get_user_by_email(&mut self, email: &str) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ? AND active = 1")
            .bind(email.trim().to_lowercase())
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user.map(Into::into))
    }

    /// Store (or clear, with `None`) the digest and expiry of a pending password reset.
    ///
    /// Any earlier pair is overwritten, so only the latest token can be redeemed.
    #[instrument(skip(self, token_digest), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn set_password_reset(&mut self, id: UserId, token_digest: Option<&str>, expires_at: Option<DateTime<Utc>>) -> Result<()> {
        let result = sqlx::query("UPDATE users SET password_reset_token = ?, password_reset_expires = ? WHERE id = ?")
            .bind(token_digest)
            .bind(expires_at)
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// Find the active user holding a reset token digest. Expiry is left to the caller.
    #[instrument(skip(self, token_digest), err)]
    pub async fn find_by_reset_token(&mut self, token_digest: &str) -> Result<Option<PasswordResetDBResponse>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE password_reset_token = ? AND active = 1")
            .bind(token_digest)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user.and_then(|user| {
            let expires_at = user.password_reset_expires?;
            Some(PasswordResetDBResponse {
                user: user.into(),
                expires_at,
            })
        }))
    }

    /// Rotate the password hash, stamp the change time and drop any pending reset.
    #[instrument(skip(self, password_hash), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn set_password(&mut self, id: UserId, password_hash: &str, changed_at: DateTime<Utc>) -> Result<UserDBResponse> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                password_hash = ?,
                password_changed_at = ?,
                password_reset_token = NULL,
                password_reset_expires = NULL,
                updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(password_hash)
        .bind(changed_at)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(user.into())
    }

    /// Soft delete: the account disappears from every lookup but keeps its reviews and bookings.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn deactivate(&mut self, id: UserId) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET active = 0, updated_at = ? WHERE id = ? AND active = 1")
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Used at start-up to make sure the configured admin account exists with the given password.
    #[instrument(skip(self, email, password_hash), err)]
    pub async fn upsert_admin(&mut self, email: &str, password_hash: Option<&str>) -> Result<UserId> {
        let email = email.trim().to_lowercase();
        let existing: Option<UserId> = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
            .bind(&email)
            .fetch_optional(&mut *self.db)
            .await?;

        if let Some(id) = existing {
            sqlx::query("UPDATE users SET role = 'admin', active = 1, password_hash = COALESCE(?, password_hash), updated_at = ? WHERE id = ?")
                .bind(password_hash)
                .bind(Utc::now())
                .bind(id)
                .execute(&mut *self.db)
                .await?;
            return Ok(id);
        }

        let name = email.split('@').next().unwrap_or("admin").to_string();
        let created = self
            .create(&UserCreateDBRequest {
                name,
                email,
                photo: None,
                role: Role::Admin,
                password_hash: password_hash.unwrap_or(UNUSABLE_HASH).to_string(),
            })
            .await?;
        Ok(created.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sqlx::SqlitePool;

    fn request(name: &str, email: &str) -> UserCreateDBRequest {
        UserCreateDBRequest {
            name: name.to_string(),
            email: email.to_string(),
            photo: None,
            role: Role::User,
            password_hash: "$argon2id$v=19$placeholder".to_string(),
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_user(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let user = repo.create(&request("Test User", "test@example.com")).await.unwrap();
        assert_eq!(user.name, "Test User");
        assert_eq!(user.email, "test@example.com");
        assert_eq!(user.photo, "default.jpg");
        assert_eq!(user.role, Role::User);
        assert!(user.active);
        assert!(user.password_changed_at.is_none());

        let fetched = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, user.id);
        assert_eq!(fetched.role, Role::User);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_duplicate_email_is_unique_violation(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        repo.create(&request("One", "same@example.com")).await.unwrap();
        let err = repo.create(&request("Two", "same@example.com")).await.unwrap_err();

        match err {
            DbError::UniqueViolation { table, columns, .. } => {
                assert_eq!(table.as_deref(), Some("users"));
                assert_eq!(columns, vec!["email".to_string()]);
            }
            other => panic!("expected unique violation, got {other:?}"),
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_deactivated_user_is_invisible(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let user = repo.create(&request("Gone Soon", "gone@example.com")).await.unwrap();
        repo.create(&request("Staying", "stay@example.com")).await.unwrap();

        assert!(repo.deactivate(user.id).await.unwrap());
        assert!(!repo.deactivate(user.id).await.unwrap());

        assert!(repo.get_by_id(user.id).await.unwrap().is_none());
        assert!(repo.get_user_by_email("gone@example.com").await.unwrap().is_none());

        let filter = ListFilter::default();
        let listed = repo.list(&filter).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(repo.count(&filter).await.unwrap(), 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_email_lookup_is_case_insensitive(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let user = repo.create(&request("Case", "case@example.com")).await.unwrap();
        let found = repo.get_user_by_email("  CASE@Example.com").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_reset_token_lifecycle(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let user = repo.create(&request("Reset Me", "reset@example.com")).await.unwrap();
        let expires = Utc::now() + Duration::minutes(10);

        repo.set_password_reset(user.id, Some("digest-one"), Some(expires)).await.unwrap();
        let pending = repo.find_by_reset_token("digest-one").await.unwrap().unwrap();
        assert_eq!(pending.user.id, user.id);
        assert_eq!(pending.expires_at.timestamp(), expires.timestamp());

        // A second request replaces the first digest
        repo.set_password_reset(user.id, Some("digest-two"), Some(expires)).await.unwrap();
        assert!(repo.find_by_reset_token("digest-one").await.unwrap().is_none());
        assert!(repo.find_by_reset_token("digest-two").await.unwrap().is_some());

        // Rotating the password consumes the reset
        let changed_at = Utc::now();
        let updated = repo.set_password(user.id, "$argon2id$v=19$new", changed_at).await.unwrap();
        assert_eq!(updated.password_hash, "$argon2id$v=19$new");
        assert_eq!(updated.password_changed_at.map(|t| t.timestamp()), Some(changed_at.timestamp()));
        assert!(repo.find_by_reset_token("digest-two").await.unwrap().is_none());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_user(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let user = repo.create(&request("Old Name", "old@example.com")).await.unwrap();
        let updated = repo
            .update(
                user.id,
                &UserUpdateDBRequest {
                    name: Some("New Name".to_string()),
                    role: Some(Role::Guide),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "New Name");
        assert_eq!(updated.email, "old@example.com");
        assert_eq!(updated.role, Role::Guide);

        let missing = repo.update(Uuid::new_v4(), &UserUpdateDBRequest::default()).await;
        assert!(matches!(missing, Err(DbError::NotFound)));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_upsert_admin(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let id = repo.upsert_admin("Admin@Example.com", Some("hash-1")).await.unwrap();
        let admin = repo.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert_eq!(admin.email, "admin@example.com");
        assert_eq!(admin.password_hash, "hash-1");

        // Second run keeps the same account and updates the hash
        let again = repo.upsert_admin("admin@example.com", Some("hash-2")).await.unwrap();
        assert_eq!(again, id);
        let admin = repo.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(admin.password_hash, "hash-2");
    }
}
