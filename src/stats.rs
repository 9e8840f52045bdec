//! Sales statistics for the admin dashboard.
//!
//! Revenue figures count paid orders only; pending orders are money
//! that has not arrived and canceled/refunded orders are money that
//! left again.

use sqlx::SqlitePool;

use crate::money::{InvalidAmountError, Nok};
use crate::order::{self, Order, OrderError, OrderStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthlySales {
    pub month: u32,
    pub total: Nok,
}

#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error(transparent)]
    Amount(#[from] InvalidAmountError),
    #[error(transparent)]
    Order(#[from] OrderError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Paid sales per month for the given year. Months without sales are
/// absent from the result.
pub async fn monthly_sales(pool: &SqlitePool, year: i32) -> Result<Vec<MonthlySales>, StatsError> {
    let rows: Vec<(i64, i64)> = sqlx::query_as(
        "SELECT CAST(strftime('%m', created_at) AS INTEGER) AS month, \
                COALESCE(SUM(total_ore), 0) AS total_ore \
         FROM orders \
         WHERE strftime('%Y', created_at) = ?1 AND status = ?2 \
         GROUP BY month ORDER BY month ASC",
    )
    .bind(format!("{year:04}"))
    .bind(OrderStatus::Paid.as_str())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(month, total_ore)| {
            Ok(MonthlySales {
                month: month as u32,
                total: Nok::from_ore(total_ore)?,
            })
        })
        .collect()
}

/// Orders still awaiting payment.
pub async fn unprocessed_orders(pool: &SqlitePool) -> Result<Vec<Order>, StatsError> {
    Ok(order::list_by_status(pool, OrderStatus::Pending).await?)
}

/// Paid orders that have not shipped yet.
pub async fn paid_unshipped_count(pool: &SqlitePool) -> Result<i64, StatsError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE status = ?1")
        .bind(OrderStatus::Paid.as_str())
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn total_users(pool: &SqlitePool) -> Result<i64, StatsError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn total_orders(pool: &SqlitePool) -> Result<i64, StatsError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Revenue across all paid orders.
pub async fn total_revenue(pool: &SqlitePool) -> Result<Nok, StatsError> {
    let total_ore: i64 =
        sqlx::query_scalar("SELECT COALESCE(SUM(total_ore), 0) FROM orders WHERE status = ?1")
            .bind(OrderStatus::Paid.as_str())
            .fetch_one(pool)
            .await?;
    Ok(Nok::from_ore(total_ore)?)
}
