//! Customer directory: profile records referenced by orders and CRM notes.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::fmt::Display;
use tracing::info;

use crate::page::Page;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(transparent)]
pub struct CustomerId(i64);

impl CustomerId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub const fn value(self) -> i64 {
        self.0
    }
}

impl Display for CustomerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Customer {
    pub id: CustomerId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Payload for registering a new customer.
#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

/// Typed partial update: only the populated fields are written.
#[derive(Debug, Clone, Default)]
pub struct CustomerPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum CustomerError {
    #[error("Customer not found: {0}")]
    NotFound(CustomerId),
    #[error("Email already registered: {0}")]
    EmailTaken(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub async fn create(pool: &SqlitePool, new: NewCustomer) -> Result<Customer, CustomerError> {
    if find_by_email(pool, &new.email).await?.is_some() {
        return Err(CustomerError::EmailTaken(new.email));
    }

    let created_at = Utc::now();
    let result = sqlx::query(
        "INSERT INTO customers \
         (first_name, last_name, email, phone, address, city, postal_code, country, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )
    .bind(&new.first_name)
    .bind(&new.last_name)
    .bind(&new.email)
    .bind(&new.phone)
    .bind(&new.address)
    .bind(&new.city)
    .bind(&new.postal_code)
    .bind(&new.country)
    .bind(created_at)
    .execute(pool)
    .await?;

    let id = CustomerId(result.last_insert_rowid());
    info!(customer_id = %id, email = %new.email, "Registered customer");

    Ok(Customer {
        id,
        first_name: new.first_name,
        last_name: new.last_name,
        email: new.email,
        phone: new.phone,
        address: new.address,
        city: new.city,
        postal_code: new.postal_code,
        country: new.country,
        created_at,
    })
}

pub async fn find_by_id(
    pool: &SqlitePool,
    id: CustomerId,
) -> Result<Option<Customer>, CustomerError> {
    let customer = sqlx::query_as::<_, Customer>(
        "SELECT id, first_name, last_name, email, phone, address, city, postal_code, country, \
         created_at \
         FROM customers WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(customer)
}

pub async fn find_by_email(
    pool: &SqlitePool,
    email: &str,
) -> Result<Option<Customer>, CustomerError> {
    let customer = sqlx::query_as::<_, Customer>(
        "SELECT id, first_name, last_name, email, phone, address, city, postal_code, country, \
         created_at \
         FROM customers WHERE email = ?1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;

    Ok(customer)
}

pub async fn list(pool: &SqlitePool, page: Page) -> Result<Vec<Customer>, CustomerError> {
    let customers = sqlx::query_as::<_, Customer>(
        "SELECT id, first_name, last_name, email, phone, address, city, postal_code, country, \
         created_at \
         FROM customers ORDER BY id ASC LIMIT ?1 OFFSET ?2",
    )
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    Ok(customers)
}

pub async fn update(
    pool: &SqlitePool,
    id: CustomerId,
    patch: CustomerPatch,
) -> Result<Customer, CustomerError> {
    let existing = find_by_id(pool, id)
        .await?
        .ok_or(CustomerError::NotFound(id))?;

    if let Some(email) = &patch.email {
        if email != &existing.email && find_by_email(pool, email).await?.is_some() {
            return Err(CustomerError::EmailTaken(email.clone()));
        }
    }

    let updated = Customer {
        id: existing.id,
        first_name: patch.first_name.unwrap_or(existing.first_name),
        last_name: patch.last_name.unwrap_or(existing.last_name),
        email: patch.email.unwrap_or(existing.email),
        phone: patch.phone.or(existing.phone),
        address: patch.address.or(existing.address),
        city: patch.city.or(existing.city),
        postal_code: patch.postal_code.or(existing.postal_code),
        country: patch.country.or(existing.country),
        created_at: existing.created_at,
    };

    sqlx::query(
        "UPDATE customers SET first_name = ?1, last_name = ?2, email = ?3, phone = ?4, \
         address = ?5, city = ?6, postal_code = ?7, country = ?8 \
         WHERE id = ?9",
    )
    .bind(&updated.first_name)
    .bind(&updated.last_name)
    .bind(&updated.email)
    .bind(&updated.phone)
    .bind(&updated.address)
    .bind(&updated.city)
    .bind(&updated.postal_code)
    .bind(&updated.country)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(updated)
}

/// Deletes a customer. Their orders survive with the customer
/// reference cleared; CRM notes are removed with the profile.
pub async fn delete(pool: &SqlitePool, id: CustomerId) -> Result<(), CustomerError> {
    let result = sqlx::query("DELETE FROM customers WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(CustomerError::NotFound(id));
    }

    info!(customer_id = %id, "Deleted customer");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{NewCustomerBuilder, setup_test_db};

    #[tokio::test]
    async fn create_and_find_round_trip() {
        let pool = setup_test_db().await;
        let created = create(&pool, NewCustomerBuilder::new().build())
            .await
            .unwrap();

        let found = find_by_id(&pool, created.id).await.unwrap().unwrap();
        assert_eq!(found, created);
    }

    #[tokio::test]
    async fn create_rejects_duplicate_email() {
        let pool = setup_test_db().await;
        let new = NewCustomerBuilder::new()
            .with_email("kari@example.com")
            .build();
        create(&pool, new.clone()).await.unwrap();

        let err = create(&pool, new).await.unwrap_err();
        assert!(matches!(err, CustomerError::EmailTaken(email) if email == "kari@example.com"));
    }

    #[tokio::test]
    async fn patch_updates_only_populated_fields() {
        let pool = setup_test_db().await;
        let created = create(
            &pool,
            NewCustomerBuilder::new()
                .with_name("Ola", "Nordmann")
                .build(),
        )
        .await
        .unwrap();

        let patch = CustomerPatch {
            city: Some("Bergen".to_string()),
            ..CustomerPatch::default()
        };
        let updated = update(&pool, created.id, patch).await.unwrap();

        assert_eq!(updated.first_name, "Ola");
        assert_eq!(updated.city.as_deref(), Some("Bergen"));
        assert_eq!(updated.email, created.email);
    }

    #[tokio::test]
    async fn update_missing_customer_is_not_found() {
        let pool = setup_test_db().await;
        let err = update(&pool, CustomerId::new(404), CustomerPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CustomerError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_removes_customer() {
        let pool = setup_test_db().await;
        let created = create(&pool, NewCustomerBuilder::new().build())
            .await
            .unwrap();

        delete(&pool, created.id).await.unwrap();
        assert!(find_by_id(&pool, created.id).await.unwrap().is_none());

        let err = delete(&pool, created.id).await.unwrap_err();
        assert!(matches!(err, CustomerError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_paginates_in_id_order() {
        let pool = setup_test_db().await;
        for i in 0..5 {
            create(
                &pool,
                NewCustomerBuilder::new()
                    .with_email(&format!("customer{i}@example.com"))
                    .build(),
            )
            .await
            .unwrap();
        }

        let page = list(&pool, Page::new(2, 2)).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].email, "customer2@example.com");
        assert_eq!(page[1].email, "customer3@example.com");
    }
}
