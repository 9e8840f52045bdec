//! Product catalog.
//!
//! Stock is owned by the inventory ledger; catalog operations here
//! only set the initial count at creation. Price edits never touch
//! existing order lines, which capture the unit price at order time.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use std::fmt::Display;
use tracing::info;

use crate::money::{InvalidAmountError, Nok};
use crate::page::Page;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(transparent)]
pub struct ProductId(i64);

impl ProductId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub const fn value(self) -> i64 {
        self.0
    }
}

impl Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub price: Nok,
    pub stock: i64,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for Product {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let price_ore: i64 = row.try_get("price_ore")?;
        let price = Nok::from_ore(price_ore).map_err(|e| sqlx::Error::ColumnDecode {
            index: "price_ore".into(),
            source: Box::new(e),
        })?;

        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            price,
            stock: row.try_get("stock")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Payload for adding a product to the catalog.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub price: Nok,
    pub stock: i64,
}

/// Typed partial update: only the populated fields are written.
/// Stock is deliberately absent; use the inventory ledger.
#[derive(Debug, Clone, Default)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Nok>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProductError {
    #[error("Product not found: {0}")]
    NotFound(ProductId),
    #[error("Invalid initial stock: {0}")]
    InvalidStock(i64),
    #[error(transparent)]
    InvalidAmount(#[from] InvalidAmountError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub async fn create(pool: &SqlitePool, new: NewProduct) -> Result<Product, ProductError> {
    if new.stock < 0 {
        return Err(ProductError::InvalidStock(new.stock));
    }

    let created_at = Utc::now();
    let result = sqlx::query(
        "INSERT INTO products (name, description, price_ore, stock, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(&new.name)
    .bind(&new.description)
    .bind(new.price.as_ore())
    .bind(new.stock)
    .bind(created_at)
    .execute(pool)
    .await?;

    let id = ProductId(result.last_insert_rowid());
    info!(product_id = %id, name = %new.name, price = %new.price, stock = new.stock, "Added product");

    Ok(Product {
        id,
        name: new.name,
        description: new.description,
        price: new.price,
        stock: new.stock,
        created_at,
    })
}

pub async fn find_by_id(
    pool: &SqlitePool,
    id: ProductId,
) -> Result<Option<Product>, ProductError> {
    let product = sqlx::query_as::<_, Product>(
        "SELECT id, name, description, price_ore, stock, created_at \
         FROM products WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(product)
}

pub async fn list(pool: &SqlitePool, page: Page) -> Result<Vec<Product>, ProductError> {
    let products = sqlx::query_as::<_, Product>(
        "SELECT id, name, description, price_ore, stock, created_at \
         FROM products ORDER BY id ASC LIMIT ?1 OFFSET ?2",
    )
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    Ok(products)
}

pub async fn update(
    pool: &SqlitePool,
    id: ProductId,
    patch: ProductPatch,
) -> Result<Product, ProductError> {
    let existing = find_by_id(pool, id)
        .await?
        .ok_or(ProductError::NotFound(id))?;

    let updated = Product {
        id: existing.id,
        name: patch.name.unwrap_or(existing.name),
        description: patch.description.or(existing.description),
        price: patch.price.unwrap_or(existing.price),
        stock: existing.stock,
        created_at: existing.created_at,
    };

    sqlx::query("UPDATE products SET name = ?1, description = ?2, price_ore = ?3 WHERE id = ?4")
        .bind(&updated.name)
        .bind(&updated.description)
        .bind(updated.price.as_ore())
        .bind(id)
        .execute(pool)
        .await?;

    Ok(updated)
}

/// Deletes a product. Order lines referencing it keep their captured
/// quantity and unit price with the product reference cleared.
pub async fn delete(pool: &SqlitePool, id: ProductId) -> Result<(), ProductError> {
    let result = sqlx::query("DELETE FROM products WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ProductError::NotFound(id));
    }

    info!(product_id = %id, "Removed product");
    Ok(())
}
