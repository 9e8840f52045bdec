//! User account administration.
//!
//! Users are login identities (admin staff or shop customers); the
//! customer directory holds the shipping profile separately, linked
//! by email.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use std::fmt::Display;
use tracing::info;

use crate::auth::{Role, generate_salt, hash_password};
use crate::page::Page;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(transparent)]
pub struct UserId(i64);

impl UserId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub const fn value(self) -> i64 {
        self.0
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub(crate) password_hash: String,
    pub(crate) password_salt: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for User {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let role: String = row.try_get("role")?;
        let role = role.parse().map_err(|e| sqlx::Error::ColumnDecode {
            index: "role".into(),
            source: Box::new(e),
        })?;

        Ok(Self {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            password_salt: row.try_get("password_salt")?,
            role,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Payload for registering a login account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("User not found: {0}")]
    NotFound(UserId),
    #[error("Email already registered: {0}")]
    EmailTaken(String),
    #[error("Password must not be empty")]
    EmptyPassword,
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub async fn create(pool: &SqlitePool, new: NewUser) -> Result<User, UserError> {
    if new.password.is_empty() {
        return Err(UserError::EmptyPassword);
    }
    if find_by_email(pool, &new.email).await?.is_some() {
        return Err(UserError::EmailTaken(new.email));
    }

    let salt = generate_salt();
    let hash = hash_password(&salt, &new.password);
    let created_at = Utc::now();

    let result = sqlx::query(
        "INSERT INTO users (email, password_hash, password_salt, role, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(&new.email)
    .bind(&hash)
    .bind(&salt)
    .bind(new.role.as_str())
    .bind(created_at)
    .execute(pool)
    .await?;

    let id = UserId(result.last_insert_rowid());
    info!(user_id = %id, email = %new.email, role = %new.role, "Registered user");

    Ok(User {
        id,
        email: new.email,
        password_hash: hash,
        password_salt: salt,
        role: new.role,
        created_at,
    })
}

pub async fn find_by_id(pool: &SqlitePool, id: UserId) -> Result<Option<User>, UserError> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, email, password_hash, password_salt, role, created_at \
         FROM users WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

pub async fn find_by_email(pool: &SqlitePool, email: &str) -> Result<Option<User>, UserError> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, email, password_hash, password_salt, role, created_at \
         FROM users WHERE email = ?1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

pub async fn list(pool: &SqlitePool, page: Page) -> Result<Vec<User>, UserError> {
    let users = sqlx::query_as::<_, User>(
        "SELECT id, email, password_hash, password_salt, role, created_at \
         FROM users ORDER BY id ASC LIMIT ?1 OFFSET ?2",
    )
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    Ok(users)
}

/// Replaces a user's email, password and role wholesale; the
/// password is re-salted.
pub async fn update(pool: &SqlitePool, id: UserId, new: NewUser) -> Result<User, UserError> {
    if new.password.is_empty() {
        return Err(UserError::EmptyPassword);
    }

    let existing = find_by_id(pool, id).await?.ok_or(UserError::NotFound(id))?;

    if new.email != existing.email && find_by_email(pool, &new.email).await?.is_some() {
        return Err(UserError::EmailTaken(new.email));
    }

    let salt = generate_salt();
    let hash = hash_password(&salt, &new.password);

    sqlx::query(
        "UPDATE users SET email = ?1, password_hash = ?2, password_salt = ?3, role = ?4 \
         WHERE id = ?5",
    )
    .bind(&new.email)
    .bind(&hash)
    .bind(&salt)
    .bind(new.role.as_str())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(User {
        id,
        email: new.email,
        password_hash: hash,
        password_salt: salt,
        role: new.role,
        created_at: existing.created_at,
    })
}

pub async fn delete(pool: &SqlitePool, id: UserId) -> Result<(), UserError> {
    let result = sqlx::query("DELETE FROM users WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(UserError::NotFound(id));
    }

    info!(user_id = %id, "Deleted user");
    Ok(())
}
