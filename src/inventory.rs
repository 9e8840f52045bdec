//! Inventory ledger: the single owner of product stock counts.
//!
//! Stock never goes negative. Decrements are a guarded UPDATE
//! (`stock = stock - ? WHERE stock >= ?`) so the check and the write
//! are one statement; two concurrent decrements can never both pass a
//! stale check. Callers run decrement/increment inside the same
//! transaction as the order mutation that triggered them.

use sqlx::SqlitePool;
use tracing::info;

use crate::product::ProductId;

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: i64,
        available: i64,
    },
    #[error("Stock adjustment must be non-zero")]
    ZeroAdjustment,
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(i64),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Removes `quantity` units from stock, failing without effect when
/// fewer than `quantity` units remain. Returns the updated stock.
pub(crate) async fn decrement(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    product_id: ProductId,
    quantity: i64,
) -> Result<i64, InventoryError> {
    if quantity <= 0 {
        return Err(InventoryError::InvalidQuantity(quantity));
    }

    let result = sqlx::query("UPDATE products SET stock = stock - ?1 WHERE id = ?2 AND stock >= ?1")
        .bind(quantity)
        .bind(product_id)
        .execute(tx.as_mut())
        .await?;

    if result.rows_affected() == 0 {
        // The guard failed: distinguish a missing product from a
        // shortfall by reading what is actually there.
        let available = read_stock(tx, product_id)
            .await?
            .ok_or(InventoryError::ProductNotFound(product_id))?;
        return Err(InventoryError::InsufficientStock {
            product_id,
            requested: quantity,
            available,
        });
    }

    let stock = read_stock(tx, product_id)
        .await?
        .ok_or(InventoryError::ProductNotFound(product_id))?;

    Ok(stock)
}

/// Returns `quantity` units to stock. Unbounded above. Returns the
/// updated stock.
pub(crate) async fn increment(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    product_id: ProductId,
    quantity: i64,
) -> Result<i64, InventoryError> {
    if quantity <= 0 {
        return Err(InventoryError::InvalidQuantity(quantity));
    }

    let result = sqlx::query("UPDATE products SET stock = stock + ?1 WHERE id = ?2")
        .bind(quantity)
        .bind(product_id)
        .execute(tx.as_mut())
        .await?;

    if result.rows_affected() == 0 {
        return Err(InventoryError::ProductNotFound(product_id));
    }

    let stock = read_stock(tx, product_id)
        .await?
        .ok_or(InventoryError::ProductNotFound(product_id))?;

    Ok(stock)
}

/// Admin stock adjustment: positive delta receives goods, negative
/// delta writes stock off, guarded like any other decrement. Runs in
/// its own transaction and returns the updated stock.
#[tracing::instrument(skip(pool), level = tracing::Level::INFO)]
pub async fn adjust_stock(
    pool: &SqlitePool,
    product_id: ProductId,
    delta: i64,
) -> Result<i64, InventoryError> {
    if delta == 0 {
        return Err(InventoryError::ZeroAdjustment);
    }

    let mut tx = pool.begin().await?;

    let stock = if delta > 0 {
        increment(&mut tx, product_id, delta).await?
    } else {
        decrement(&mut tx, product_id, -delta).await?
    };

    tx.commit().await?;

    info!(product_id = %product_id, delta, stock, "Adjusted stock");
    Ok(stock)
}

async fn read_stock(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    product_id: ProductId,
) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar("SELECT stock FROM products WHERE id = ?1")
        .bind(product_id)
        .fetch_optional(tx.as_mut())
        .await
}
