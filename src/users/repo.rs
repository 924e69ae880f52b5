use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 hash, not exposed in JSON
    pub email: String,
    pub fitness_goal: Option<String>,
    pub role: Role,
    pub created_at: OffsetDateTime,
    pub is_deleted: bool,
}

/// Fields for a new row. The password is already hashed by the caller.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub email: String,
    pub fitness_goal: Option<String>,
    pub role: Role,
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct StoredChanges {
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub fitness_goal: Option<String>,
    pub role: Option<Role>,
}

/// Persistence contract for the credential store. Every method is a single
/// atomic server-side operation; there is no cross-call transaction, so the
/// unique indexes are the authoritative guard against duplicate races.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, new: NewUser) -> Result<User, ApiError>;
    /// Active accounts only.
    async fn get_by_id(&self, id: i64) -> Result<Option<User>, ApiError>;
    /// Active accounts only; soft-deleted accounts cannot log in.
    async fn get_by_username(&self, username: &str) -> Result<Option<User>, ApiError>;
    async fn get_by_email(&self, email: &str) -> Result<Option<User>, ApiError>;
    async fn list_active(&self) -> Result<Vec<User>, ApiError>;
    async fn list_deleted(&self) -> Result<Vec<User>, ApiError>;
    /// Applies the non-`None` fields and returns the updated row, or `None`
    /// if no active account has this id.
    async fn update(&self, id: i64, changes: StoredChanges) -> Result<Option<User>, ApiError>;
    /// Returns the number of rows flipped; 0 means absent or already deleted.
    async fn soft_delete(&self, id: i64) -> Result<u64, ApiError>;
    /// Returns the number of rows flipped; 0 means absent or already active.
    async fn restore(&self, id: i64) -> Result<u64, ApiError>;
    /// Username uniqueness spans active and deleted accounts.
    async fn username_exists(&self, username: &str) -> Result<bool, ApiError>;
    /// Email uniqueness spans active accounts only.
    async fn email_exists(&self, email: &str) -> Result<bool, ApiError>;
}

const USER_COLUMNS: &str =
    "id, username, password_hash, email, fitness_goal, role, created_at, is_deleted";

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/// Maps a unique-index violation to the duplicate kind the advisory
/// pre-checks would have reported, so a lost race and a plain duplicate look
/// identical to callers.
fn map_unique_violation(e: sqlx::Error) -> ApiError {
    if let sqlx::Error::Database(ref db_err) = e {
        match db_err.constraint() {
            Some("users_username_key") => return ApiError::DuplicateUsername,
            Some("users_email_key") => return ApiError::DuplicateEmail,
            _ => {}
        }
    }
    e.into()
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, new: NewUser) -> Result<User, ApiError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, password_hash, email, fitness_goal, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new.username)
        .bind(&new.password_hash)
        .bind(&new.email)
        .bind(&new.fitness_goal)
        .bind(new.role)
        .fetch_one(&self.db)
        .await
        .map_err(map_unique_violation)?;
        Ok(user)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND NOT is_deleted"#
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"SELECT {USER_COLUMNS} FROM users WHERE username = $1 AND NOT is_deleted"#
        ))
        .bind(username)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND NOT is_deleted"#
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn list_active(&self) -> Result<Vec<User>, ApiError> {
        let users = sqlx::query_as::<_, User>(&format!(
            r#"SELECT {USER_COLUMNS} FROM users WHERE NOT is_deleted ORDER BY id"#
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(users)
    }

    async fn list_deleted(&self) -> Result<Vec<User>, ApiError> {
        let users = sqlx::query_as::<_, User>(&format!(
            r#"SELECT {USER_COLUMNS} FROM users WHERE is_deleted ORDER BY id"#
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(users)
    }

    async fn update(&self, id: i64, changes: StoredChanges) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET email = COALESCE($2, email),
                password_hash = COALESCE($3, password_hash),
                fitness_goal = COALESCE($4, fitness_goal),
                role = COALESCE($5, role)
            WHERE id = $1 AND NOT is_deleted
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&changes.email)
        .bind(&changes.password_hash)
        .bind(&changes.fitness_goal)
        .bind(changes.role)
        .fetch_optional(&self.db)
        .await
        .map_err(map_unique_violation)?;
        Ok(user)
    }

    async fn soft_delete(&self, id: i64) -> Result<u64, ApiError> {
        let result = sqlx::query(r#"UPDATE users SET is_deleted = true WHERE id = $1 AND NOT is_deleted"#)
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }

    async fn restore(&self, id: i64) -> Result<u64, ApiError> {
        let result = sqlx::query(r#"UPDATE users SET is_deleted = false WHERE id = $1 AND is_deleted"#)
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }

    async fn username_exists(&self, username: &str) -> Result<bool, ApiError> {
        let exists: bool =
            sqlx::query_scalar(r#"SELECT EXISTS (SELECT 1 FROM users WHERE username = $1)"#)
                .bind(username)
                .fetch_one(&self.db)
                .await?;
        Ok(exists)
    }

    async fn email_exists(&self, email: &str) -> Result<bool, ApiError> {
        let exists: bool = sqlx::query_scalar(
            r#"SELECT EXISTS (SELECT 1 FROM users WHERE email = $1 AND NOT is_deleted)"#,
        )
        .bind(email)
        .fetch_one(&self.db)
        .await?;
        Ok(exists)
    }
}
