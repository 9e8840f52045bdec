//! Order aggregate: placement, lookup, lifecycle transitions and
//! deletion.
//!
//! An order is created whole or not at all. Placement validates every
//! requested line before anything is written, then inserts the order
//! shell, its lines and the matching stock decrements inside one
//! transaction. Deletion and cancellation return the reserved stock
//! through the inventory ledger in the same transaction that removes
//! or re-states the order.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::fmt::Display;
use tracing::{info, warn};

use crate::customer::CustomerId;
use crate::inventory::{self, InventoryError};
use crate::money::{InvalidAmountError, Nok};
use crate::page::Page;
use crate::product::ProductId;

mod status;

pub use status::{InvalidStatusError, OrderStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(transparent)]
pub struct OrderId(i64);

impl OrderId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub const fn value(self) -> i64 {
        self.0
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A placed order with its lines. The total and the lines never
/// change after creation; only the status moves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub id: OrderId,
    /// Cleared when the owning customer is later deleted.
    pub customer_id: Option<CustomerId>,
    pub total: Nok,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub lines: Vec<OrderLine>,
}

/// One product/quantity entry within an order. The unit price is
/// captured at order time; later catalog price edits do not reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderLine {
    pub id: i64,
    /// Cleared when the product is later deleted; quantity and the
    /// captured unit price remain authoritative.
    pub product_id: Option<ProductId>,
    pub quantity: i64,
    pub unit_price: Nok,
}

/// A requested (product, quantity) pair for order placement.
#[derive(Debug, Clone, Copy)]
pub struct LineRequest {
    pub product_id: ProductId,
    pub quantity: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Customer not found: {0}")]
    CustomerNotFound(CustomerId),
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),
    #[error(
        "Not enough stock for product '{product_name}': requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        product_name: String,
        requested: i64,
        available: i64,
    },
    #[error("Order not found: {0}")]
    NotFound(OrderId),
    #[error(transparent)]
    InvalidStatus(#[from] InvalidStatusError),
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: OrderStatus,
        to: OrderStatus,
    },
    #[error("An order needs at least one line")]
    EmptyOrder,
    #[error("Line quantity must be positive, got {0}")]
    InvalidQuantity(i64),
    #[error(transparent)]
    Amount(#[from] InvalidAmountError),
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A validated line awaiting insertion: product resolved, price
/// captured.
struct PricedLine {
    product_id: ProductId,
    product_name: String,
    quantity: i64,
    unit_price: Nok,
}

/// Places an order for `customer_id`.
///
/// Every requested line is validated (product exists, stock suffices)
/// before any write. The order shell, its lines and the stock
/// decrements are then applied in the same transaction: either the
/// whole order lands or the store is untouched.
#[tracing::instrument(
    skip(pool, lines),
    fields(customer_id = %customer_id, line_count = lines.len()),
    level = tracing::Level::INFO
)]
pub async fn create_order(
    pool: &SqlitePool,
    customer_id: CustomerId,
    lines: &[LineRequest],
) -> Result<Order, OrderError> {
    if lines.is_empty() {
        return Err(OrderError::EmptyOrder);
    }
    if let Some(line) = lines.iter().find(|line| line.quantity <= 0) {
        return Err(OrderError::InvalidQuantity(line.quantity));
    }

    let mut tx = pool.begin().await?;

    let customer_exists: Option<i64> = sqlx::query_scalar("SELECT id FROM customers WHERE id = ?1")
        .bind(customer_id)
        .fetch_optional(tx.as_mut())
        .await?;
    if customer_exists.is_none() {
        return Err(OrderError::CustomerNotFound(customer_id));
    }

    // Validation pass, in submission order, before any mutation.
    let mut priced = Vec::with_capacity(lines.len());
    for request in lines {
        let row: Option<(String, i64, i64)> =
            sqlx::query_as("SELECT name, price_ore, stock FROM products WHERE id = ?1")
                .bind(request.product_id)
                .fetch_optional(tx.as_mut())
                .await?;
        let (name, price_ore, stock) =
            row.ok_or(OrderError::ProductNotFound(request.product_id))?;

        if stock < request.quantity {
            return Err(OrderError::InsufficientStock {
                product_id: request.product_id,
                product_name: name,
                requested: request.quantity,
                available: stock,
            });
        }

        priced.push(PricedLine {
            product_id: request.product_id,
            product_name: name,
            quantity: request.quantity,
            unit_price: Nok::from_ore(price_ore)?,
        });
    }

    // Total from the prices captured above, never re-read.
    let mut total = Nok::ZERO;
    for line in &priced {
        total = total.checked_add(line.unit_price.times(line.quantity)?)?;
    }

    let created_at = Utc::now();
    let result = sqlx::query(
        "INSERT INTO orders (customer_id, total_ore, status, created_at) VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(customer_id)
    .bind(total.as_ore())
    .bind(OrderStatus::Pending.as_str())
    .bind(created_at)
    .execute(tx.as_mut())
    .await?;
    let order_id = OrderId(result.last_insert_rowid());

    let mut order_lines = Vec::with_capacity(priced.len());
    for line in &priced {
        let inserted = sqlx::query(
            "INSERT INTO order_lines (order_id, product_id, quantity, unit_price_ore) \
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(order_id)
        .bind(line.product_id)
        .bind(line.quantity)
        .bind(line.unit_price.as_ore())
        .execute(tx.as_mut())
        .await?;

        // The guarded decrement is the authoritative stock check; a
        // concurrent order may have consumed stock since the
        // validation read.
        match inventory::decrement(&mut tx, line.product_id, line.quantity).await {
            Ok(_) => {}
            Err(InventoryError::InsufficientStock {
                requested,
                available,
                ..
            }) => {
                return Err(OrderError::InsufficientStock {
                    product_id: line.product_id,
                    product_name: line.product_name.clone(),
                    requested,
                    available,
                });
            }
            Err(e) => return Err(e.into()),
        }

        order_lines.push(OrderLine {
            id: inserted.last_insert_rowid(),
            product_id: Some(line.product_id),
            quantity: line.quantity,
            unit_price: line.unit_price,
        });
    }

    tx.commit().await?;

    info!(order_id = %order_id, customer_id = %customer_id, total = %total, "Placed order");

    Ok(Order {
        id: order_id,
        customer_id: Some(customer_id),
        total,
        status: OrderStatus::Pending,
        created_at,
        lines: order_lines,
    })
}

pub async fn find_by_id(pool: &SqlitePool, id: OrderId) -> Result<Option<Order>, OrderError> {
    let mut tx = pool.begin().await?;
    let order = load_within_tx(&mut tx, id).await?;
    tx.commit().await?;
    Ok(order)
}

pub async fn list(pool: &SqlitePool, page: Page) -> Result<Vec<Order>, OrderError> {
    let rows = sqlx::query_as::<_, OrderRow>(
        "SELECT id, customer_id, total_ore, status, created_at \
         FROM orders ORDER BY id ASC LIMIT ?1 OFFSET ?2",
    )
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    let mut orders = Vec::with_capacity(rows.len());
    for row in rows {
        let lines = fetch_lines(pool, OrderId(row.id)).await?;
        orders.push(row.into_order(lines)?);
    }
    Ok(orders)
}

/// All orders currently in `status`, oldest first.
pub async fn list_by_status(
    pool: &SqlitePool,
    status: OrderStatus,
) -> Result<Vec<Order>, OrderError> {
    let rows = sqlx::query_as::<_, OrderRow>(
        "SELECT id, customer_id, total_ore, status, created_at \
         FROM orders WHERE status = ?1 ORDER BY id ASC",
    )
    .bind(status.as_str())
    .fetch_all(pool)
    .await?;

    let mut orders = Vec::with_capacity(rows.len());
    for row in rows {
        let lines = fetch_lines(pool, OrderId(row.id)).await?;
        orders.push(row.into_order(lines)?);
    }
    Ok(orders)
}

/// Administrator status update. Only the status value itself is
/// validated; any recognized target is applied. Entering `canceled`
/// while the order still holds stock returns the reservation.
#[tracing::instrument(skip(pool), level = tracing::Level::INFO)]
pub async fn update_status(
    pool: &SqlitePool,
    id: OrderId,
    new_status: &str,
) -> Result<Order, OrderError> {
    let target: OrderStatus = new_status.parse()?;

    let mut tx = pool.begin().await?;
    let mut order = load_within_tx(&mut tx, id)
        .await?
        .ok_or(OrderError::NotFound(id))?;

    set_status_within_tx(&mut tx, &order, target).await?;
    tx.commit().await?;

    info!(order_id = %id, from = %order.status, to = %target, "Updated order status");
    order.status = target;
    Ok(order)
}

/// Lifecycle transition for callback-driven callers: strictly gated
/// by the transition table.
pub(crate) async fn transition(
    pool: &SqlitePool,
    id: OrderId,
    target: OrderStatus,
) -> Result<Order, OrderError> {
    let mut tx = pool.begin().await?;
    let mut order = load_within_tx(&mut tx, id)
        .await?
        .ok_or(OrderError::NotFound(id))?;

    if !order.status.can_transition_to(target) {
        return Err(OrderError::InvalidTransition {
            from: order.status,
            to: target,
        });
    }

    set_status_within_tx(&mut tx, &order, target).await?;
    tx.commit().await?;

    info!(order_id = %id, from = %order.status, to = %target, "Order transitioned");
    order.status = target;
    Ok(order)
}

/// Deletes an order: restores still-reserved stock, removes the
/// lines, removes the order, all in one transaction.
#[tracing::instrument(skip(pool), level = tracing::Level::INFO)]
pub async fn delete_order(pool: &SqlitePool, id: OrderId) -> Result<(), OrderError> {
    let mut tx = pool.begin().await?;
    let order = load_within_tx(&mut tx, id)
        .await?
        .ok_or(OrderError::NotFound(id))?;

    if order.status.holds_stock() {
        restore_lines(&mut tx, id, &order.lines).await?;
    }

    sqlx::query("DELETE FROM order_lines WHERE order_id = ?1")
        .bind(id)
        .execute(tx.as_mut())
        .await?;
    sqlx::query("DELETE FROM orders WHERE id = ?1")
        .bind(id)
        .execute(tx.as_mut())
        .await?;

    tx.commit().await?;

    info!(order_id = %id, status = %order.status, "Deleted order");
    Ok(())
}

/// Applies `target`, restoring stock when the order leaves a
/// stock-holding state for `canceled`. Stock restored on
/// cancellation is never restored again by a later deletion, because
/// `canceled` no longer holds stock.
async fn set_status_within_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    order: &Order,
    target: OrderStatus,
) -> Result<(), OrderError> {
    if target == OrderStatus::Canceled && order.status.holds_stock() {
        restore_lines(tx, order.id, &order.lines).await?;
    }

    sqlx::query("UPDATE orders SET status = ?1 WHERE id = ?2")
        .bind(target.as_str())
        .bind(order.id)
        .execute(tx.as_mut())
        .await?;

    Ok(())
}

/// Returns each line's quantity to inventory. Lines whose product no
/// longer exists are skipped: the stock has nowhere to return to, and
/// the surrounding cancellation or deletion still succeeds.
async fn restore_lines(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    order_id: OrderId,
    lines: &[OrderLine],
) -> Result<(), OrderError> {
    for line in lines {
        let Some(product_id) = line.product_id else {
            warn!(order_id = %order_id, line_id = line.id, "Product gone, skipping stock restoration");
            continue;
        };

        match inventory::increment(tx, product_id, line.quantity).await {
            Ok(stock) => {
                info!(order_id = %order_id, product_id = %product_id, quantity = line.quantity, stock, "Restored stock");
            }
            Err(InventoryError::ProductNotFound(_)) => {
                warn!(order_id = %order_id, product_id = %product_id, "Product gone, skipping stock restoration");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    customer_id: Option<i64>,
    total_ore: i64,
    status: String,
    created_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, lines: Vec<OrderLine>) -> Result<Order, OrderError> {
        Ok(Order {
            id: OrderId(self.id),
            customer_id: self.customer_id.map(CustomerId::new),
            total: Nok::from_ore(self.total_ore)?,
            status: self.status.parse()?,
            created_at: self.created_at,
            lines,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LineRow {
    id: i64,
    product_id: Option<i64>,
    quantity: i64,
    unit_price_ore: i64,
}

impl LineRow {
    fn into_line(self) -> Result<OrderLine, OrderError> {
        Ok(OrderLine {
            id: self.id,
            product_id: self.product_id.map(ProductId::new),
            quantity: self.quantity,
            unit_price: Nok::from_ore(self.unit_price_ore)?,
        })
    }
}

async fn load_within_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    id: OrderId,
) -> Result<Option<Order>, OrderError> {
    let row = sqlx::query_as::<_, OrderRow>(
        "SELECT id, customer_id, total_ore, status, created_at FROM orders WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(tx.as_mut())
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let line_rows = sqlx::query_as::<_, LineRow>(
        "SELECT id, product_id, quantity, unit_price_ore FROM order_lines \
         WHERE order_id = ?1 ORDER BY id ASC",
    )
    .bind(id)
    .fetch_all(tx.as_mut())
    .await?;

    let lines = line_rows
        .into_iter()
        .map(LineRow::into_line)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(row.into_order(lines)?))
}

async fn fetch_lines(pool: &SqlitePool, id: OrderId) -> Result<Vec<OrderLine>, OrderError> {
    let line_rows = sqlx::query_as::<_, LineRow>(
        "SELECT id, product_id, quantity, unit_price_ore FROM order_lines \
         WHERE order_id = ?1 ORDER BY id ASC",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    line_rows.into_iter().map(LineRow::into_line).collect()
}
