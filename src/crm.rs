//! CRM notes attached to customers.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::info;

use crate::customer::CustomerId;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct CrmNote {
    pub id: i64,
    pub customer_id: CustomerId,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum CrmError {
    #[error("Customer not found: {0}")]
    CustomerNotFound(CustomerId),
    #[error("Note text must not be empty")]
    EmptyNote,
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub async fn create_note(
    pool: &SqlitePool,
    customer_id: CustomerId,
    note: &str,
) -> Result<CrmNote, CrmError> {
    if note.trim().is_empty() {
        return Err(CrmError::EmptyNote);
    }

    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM customers WHERE id = ?1")
        .bind(customer_id)
        .fetch_optional(pool)
        .await?;
    if exists.is_none() {
        return Err(CrmError::CustomerNotFound(customer_id));
    }

    let created_at = Utc::now();
    let result = sqlx::query(
        "INSERT INTO crm_notes (customer_id, note, created_at) VALUES (?1, ?2, ?3)",
    )
    .bind(customer_id)
    .bind(note)
    .bind(created_at)
    .execute(pool)
    .await?;

    info!(customer_id = %customer_id, "Added CRM note");

    Ok(CrmNote {
        id: result.last_insert_rowid(),
        customer_id,
        note: note.to_string(),
        created_at,
    })
}

pub async fn notes_for_customer(
    pool: &SqlitePool,
    customer_id: CustomerId,
) -> Result<Vec<CrmNote>, CrmError> {
    let notes = sqlx::query_as::<_, CrmNote>(
        "SELECT id, customer_id, note, created_at FROM crm_notes \
         WHERE customer_id = ?1 ORDER BY id ASC",
    )
    .bind(customer_id)
    .fetch_all(pool)
    .await?;

    Ok(notes)
}
