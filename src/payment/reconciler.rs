//! Maps asynchronous provider notifications onto order lifecycle
//! transitions.
//!
//! Providers retry, duplicate and reorder their notifications, so
//! this path is deliberately forgiving: duplicate terminal statuses
//! are no-ops, out-of-order transitions are dropped with a warning,
//! and vocabulary this system does not model is ignored outright.
//! Only a notification for an order that does not exist is an error.

use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use super::PaymentError;
use crate::order::{self, OrderError, OrderId, OrderStatus};

/// Applies a provider status notification to an order.
#[tracing::instrument(skip(pool), level = tracing::Level::INFO)]
pub async fn handle_callback(
    pool: &SqlitePool,
    order_id: OrderId,
    provider_status: &str,
) -> Result<(), PaymentError> {
    let order = order::find_by_id(pool, order_id)
        .await?
        .ok_or(PaymentError::OrderNotFound(order_id))?;

    let Some(target) = map_provider_status(provider_status) else {
        debug!(
            order_id = %order_id,
            provider_status,
            "Unrecognized provider status, ignoring"
        );
        return Ok(());
    };

    if order.status == target {
        debug!(
            order_id = %order_id,
            status = %target,
            "Duplicate notification, order already there"
        );
        return Ok(());
    }

    match order::transition(pool, order_id, target).await {
        Ok(_) => {
            info!(order_id = %order_id, provider_status, status = %target, "Callback applied");
            Ok(())
        }
        Err(OrderError::InvalidTransition { from, to }) => {
            warn!(
                order_id = %order_id,
                provider_status,
                %from,
                %to,
                "Out-of-order notification, leaving order unchanged"
            );
            Ok(())
        }
        // The order can vanish between the lookup above and the
        // transition when a delete wins the race.
        Err(OrderError::NotFound(_)) => Err(PaymentError::OrderNotFound(order_id)),
        Err(e) => Err(e.into()),
    }
}

/// Translates provider vocabulary to lifecycle states. `None` means
/// the status is not modeled here and the notification is ignored.
fn map_provider_status(raw: &str) -> Option<OrderStatus> {
    match raw.to_ascii_uppercase().as_str() {
        "AUTHORIZED" | "SETTLED" | "CAPTURED" | "SUCCEEDED" | "COMPLETED" => {
            Some(OrderStatus::Paid)
        }
        "REJECTED" | "CANCELLED" | "CANCELED" | "TERMINATED" | "FAILED" | "EXPIRED" => {
            Some(OrderStatus::Canceled)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{LineRequest, create_order};
    use crate::product;
    use crate::test_utils::{NewProductBuilder, insert_customer, insert_product, setup_test_db};

    async fn order_with_stock(pool: &SqlitePool) -> (OrderId, crate::product::ProductId) {
        let customer_id = insert_customer(pool).await;
        let product_id = insert_product(
            pool,
            NewProductBuilder::new().with_price_ore(5000).with_stock(10).build(),
        )
        .await;
        let order = create_order(
            pool,
            customer_id,
            &[LineRequest {
                product_id,
                quantity: 2,
            }],
        )
        .await
        .unwrap();
        (order.id, product_id)
    }

    async fn status_of(pool: &SqlitePool, id: OrderId) -> OrderStatus {
        order::find_by_id(pool, id).await.unwrap().unwrap().status
    }

    async fn stock_of(pool: &SqlitePool, id: crate::product::ProductId) -> i64 {
        product::find_by_id(pool, id).await.unwrap().unwrap().stock
    }

    #[tokio::test]
    async fn settled_notification_marks_the_order_paid() {
        let pool = setup_test_db().await;
        let (order_id, _) = order_with_stock(&pool).await;

        handle_callback(&pool, order_id, "SETTLED").await.unwrap();
        assert_eq!(status_of(&pool, order_id).await, OrderStatus::Paid);
    }

    #[tokio::test]
    async fn unknown_status_after_paid_changes_nothing() {
        let pool = setup_test_db().await;
        let (order_id, _) = order_with_stock(&pool).await;

        handle_callback(&pool, order_id, "SETTLED").await.unwrap();
        handle_callback(&pool, order_id, "PENDING_REVIEW").await.unwrap();

        assert_eq!(status_of(&pool, order_id).await, OrderStatus::Paid);
    }

    #[tokio::test]
    async fn duplicate_terminal_notification_is_idempotent() {
        let pool = setup_test_db().await;
        let (order_id, product_id) = order_with_stock(&pool).await;
        assert_eq!(stock_of(&pool, product_id).await, 8);

        handle_callback(&pool, order_id, "REJECTED").await.unwrap();
        assert_eq!(status_of(&pool, order_id).await, OrderStatus::Canceled);
        assert_eq!(stock_of(&pool, product_id).await, 10);

        // The retry must not restore stock a second time.
        handle_callback(&pool, order_id, "REJECTED").await.unwrap();
        assert_eq!(stock_of(&pool, product_id).await, 10);
    }

    #[tokio::test]
    async fn out_of_order_cancellation_after_payment_is_dropped() {
        let pool = setup_test_db().await;
        let (order_id, product_id) = order_with_stock(&pool).await;

        handle_callback(&pool, order_id, "AUTHORIZED").await.unwrap();
        handle_callback(&pool, order_id, "REJECTED").await.unwrap();

        assert_eq!(status_of(&pool, order_id).await, OrderStatus::Paid);
        assert_eq!(stock_of(&pool, product_id).await, 8);
    }

    #[tokio::test]
    async fn unknown_order_is_reported() {
        let pool = setup_test_db().await;
        let err = handle_callback(&pool, OrderId::new(9999), "SETTLED")
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::OrderNotFound(_)));
    }

    #[tokio::test]
    async fn vocabulary_is_case_insensitive() {
        assert_eq!(map_provider_status("settled"), Some(OrderStatus::Paid));
        assert_eq!(map_provider_status("Rejected"), Some(OrderStatus::Canceled));
        assert_eq!(map_provider_status("CREATED"), None);
    }
}
