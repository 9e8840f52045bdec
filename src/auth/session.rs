//! Bearer session tokens.
//!
//! Tokens are opaque random strings persisted with their expiry; the
//! guard resolves them per request and never caches the result.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use sqlx::SqlitePool;

use super::Role;

pub(crate) const SESSION_DURATION_MINUTES: i64 = 30;
const TOKEN_SIZE: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub email: String,
    pub role: Role,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Mints and persists a session for the given identity.
pub(crate) async fn issue(
    pool: &SqlitePool,
    email: &str,
    role: Role,
) -> Result<Session, sqlx::Error> {
    let mut bytes = [0u8; TOKEN_SIZE];
    OsRng.fill_bytes(&mut bytes);
    let token = hex::encode(bytes);

    let issued_at = Utc::now();
    let expires_at = issued_at + Duration::minutes(SESSION_DURATION_MINUTES);

    sqlx::query(
        "INSERT INTO sessions (token, email, role, issued_at, expires_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(&token)
    .bind(email)
    .bind(role.as_str())
    .bind(issued_at)
    .bind(expires_at)
    .execute(pool)
    .await?;

    Ok(Session {
        token,
        email: email.to_string(),
        role,
        issued_at,
        expires_at,
    })
}

pub(crate) async fn load(pool: &SqlitePool, token: &str) -> Result<Option<Session>, sqlx::Error> {
    let row: Option<(String, String, String, DateTime<Utc>, DateTime<Utc>)> = sqlx::query_as(
        "SELECT token, email, role, issued_at, expires_at FROM sessions WHERE token = ?1",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    let Some((token, email, role, issued_at, expires_at)) = row else {
        return Ok(None);
    };

    let Ok(role) = role.parse() else {
        // A role string we no longer recognize means the session
        // predates a schema change; treat it as absent.
        return Ok(None);
    };

    Ok(Some(Session {
        token,
        email,
        role,
        issued_at,
        expires_at,
    }))
}

pub(crate) async fn revoke(pool: &SqlitePool, token: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM sessions WHERE token = ?1")
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

/// Removes expired sessions. Returns how many were dropped.
pub(crate) async fn purge_expired(pool: &SqlitePool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?1")
        .bind(Utc::now())
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::setup_test_db;

    #[tokio::test]
    async fn issued_sessions_load_back() {
        let pool = setup_test_db().await;
        let session = issue(&pool, "kunde@example.com", Role::Customer).await.unwrap();

        let loaded = load(&pool, &session.token).await.unwrap().unwrap();
        assert_eq!(loaded, session);
        assert!(!loaded.is_expired());
    }

    #[tokio::test]
    async fn unknown_token_loads_nothing() {
        let pool = setup_test_db().await;
        assert!(load(&pool, "deadbeef").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn revoked_sessions_are_gone() {
        let pool = setup_test_db().await;
        let session = issue(&pool, "kunde@example.com", Role::Customer).await.unwrap();

        revoke(&pool, &session.token).await.unwrap();
        assert!(load(&pool, &session.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn purge_drops_only_expired_sessions() {
        let pool = setup_test_db().await;
        let live = issue(&pool, "live@example.com", Role::Admin).await.unwrap();

        sqlx::query(
            "INSERT INTO sessions (token, email, role, issued_at, expires_at) \
             VALUES ('expired-token', 'old@example.com', 'customer', ?1, ?2)",
        )
        .bind(Utc::now() - Duration::hours(2))
        .bind(Utc::now() - Duration::minutes(5))
        .execute(&pool)
        .await
        .unwrap();

        let purged = purge_expired(&pool).await.unwrap();
        assert_eq!(purged, 1);
        assert!(load(&pool, &live.token).await.unwrap().is_some());
    }
}
