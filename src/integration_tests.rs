//! Cross-module scenarios: the full order/payment/authorization
//! flows wired together the way the HTTP layer drives them.

use sqlx::SqlitePool;

use crate::auth::{Guard, Operation, Principal, Role};
use crate::customer::{self, CustomerId};
use crate::money::Nok;
use crate::order::{self, LineRequest, OrderStatus};
use crate::payment::{self, MockProvider};
use crate::product::{self, ProductId};
use crate::test_utils::{
    NewCustomerBuilder, NewProductBuilder, insert_product, setup_test_db, setup_test_db_file,
    test_bootstrap_admin, test_return_url,
};
use crate::user::{self, NewUser};
use rust_decimal_macros::dec;

async fn stock_of(pool: &SqlitePool, id: ProductId) -> i64 {
    product::find_by_id(pool, id).await.unwrap().unwrap().stock
}

/// Registers a login account plus a matching customer profile, the
/// way the signup flow does.
async fn register_customer(pool: &SqlitePool, email: &str) -> CustomerId {
    user::create(
        pool,
        NewUser {
            email: email.to_string(),
            password: "passord123".to_string(),
            role: Role::Customer,
        },
    )
    .await
    .unwrap();

    customer::create(pool, NewCustomerBuilder::new().with_email(email).build())
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn order_payment_round_trip() {
    let pool = setup_test_db().await;
    let customer_id = register_customer(&pool, "kari@example.com").await;
    let product_id = insert_product(
        &pool,
        NewProductBuilder::new().with_price_ore(5000).with_stock(20).build(),
    )
    .await;

    // Place: 2 × 50.00 NOK, stock 20 -> 18.
    let order = order::create_order(
        &pool,
        customer_id,
        &[LineRequest {
            product_id,
            quantity: 2,
        }],
    )
    .await
    .unwrap();
    assert_eq!(order.total.as_decimal(), dec!(100.00));
    assert_eq!(stock_of(&pool, product_id).await, 18);

    // Pay: initiate against the mock gateway, then settle by callback.
    let provider = MockProvider::new();
    let session = payment::initiate(&pool, &provider, order.id, &test_return_url())
        .await
        .unwrap();
    assert!(session.redirect_url.as_str().contains("mock"));

    payment::handle_callback(&pool, order.id, "SETTLED").await.unwrap();
    let paid = order::find_by_id(&pool, order.id).await.unwrap().unwrap();
    assert_eq!(paid.status, OrderStatus::Paid);

    // A late unknown status leaves everything as-is.
    payment::handle_callback(&pool, order.id, "PENDING_REVIEW")
        .await
        .unwrap();
    let unchanged = order::find_by_id(&pool, order.id).await.unwrap().unwrap();
    assert_eq!(unchanged.status, OrderStatus::Paid);
    assert_eq!(stock_of(&pool, product_id).await, 18);

    // Deleting the paid order restores the reservation exactly.
    order::delete_order(&pool, order.id).await.unwrap();
    assert_eq!(stock_of(&pool, product_id).await, 20);
}

#[tokio::test]
async fn total_reflects_prices_at_order_time_only() {
    let pool = setup_test_db().await;
    let customer_id = register_customer(&pool, "kari@example.com").await;
    let product_id = insert_product(
        &pool,
        NewProductBuilder::new().with_price_ore(2500).with_stock(8).build(),
    )
    .await;

    let order = order::create_order(
        &pool,
        customer_id,
        &[LineRequest {
            product_id,
            quantity: 4,
        }],
    )
    .await
    .unwrap();

    product::update(
        &pool,
        product_id,
        product::ProductPatch {
            price: Some(Nok::from_ore(9999).unwrap()),
            ..product::ProductPatch::default()
        },
    )
    .await
    .unwrap();

    let reloaded = order::find_by_id(&pool, order.id).await.unwrap().unwrap();
    let line_sum: i64 = reloaded
        .lines
        .iter()
        .map(|line| line.unit_price.as_ore() * line.quantity)
        .sum();
    assert_eq!(line_sum, reloaded.total.as_ore());
    assert_eq!(reloaded.total.as_decimal(), dec!(100.00));
}

#[tokio::test]
async fn authorization_matrix_for_customers_and_admins() {
    let pool = setup_test_db().await;
    let guard = Guard::new(pool.clone(), test_bootstrap_admin());
    register_customer(&pool, "kari@example.com").await;

    let session = guard.login("kari@example.com", "passord123").await.unwrap();
    let customer = guard.authenticate(&session.token).await.unwrap();

    let admin_session = guard.login("admin", "adminpass").await.unwrap();
    let admin = guard.authenticate(&admin_session.token).await.unwrap();

    // Customer listing all customers: forbidden. Reading their own
    // profile: fine. Admin: both fine.
    assert!(guard.authorize(&customer, &Operation::ListCustomers).is_err());
    assert!(
        guard
            .authorize(
                &customer,
                &Operation::ReadCustomer {
                    owner_email: "kari@example.com"
                }
            )
            .is_ok()
    );
    assert!(guard.authorize(&admin, &Operation::ListCustomers).is_ok());
    assert!(
        guard
            .authorize(
                &admin,
                &Operation::ReadCustomer {
                    owner_email: "kari@example.com"
                }
            )
            .is_ok()
    );
}

#[tokio::test]
async fn customer_can_order_and_pay_for_themselves_only() {
    let pool = setup_test_db().await;
    let guard = Guard::new(pool.clone(), test_bootstrap_admin());
    register_customer(&pool, "kari@example.com").await;

    let session = guard.login("kari@example.com", "passord123").await.unwrap();
    let principal = guard.authenticate(&session.token).await.unwrap();

    assert!(guard.authorize(&principal, &Operation::CreateOrder).is_ok());
    assert!(
        guard
            .authorize(
                &principal,
                &Operation::InitiatePayment {
                    owner_email: "kari@example.com"
                }
            )
            .is_ok()
    );
    assert!(
        guard
            .authorize(
                &principal,
                &Operation::InitiatePayment {
                    owner_email: "ola@example.com"
                }
            )
            .is_err()
    );
    assert!(guard.authorize(&principal, &Operation::AdjustStock).is_err());
}

#[tokio::test]
async fn admin_cancellation_returns_stock_to_the_shelf() {
    let pool = setup_test_db().await;
    let customer_id = register_customer(&pool, "kari@example.com").await;
    let product_id = insert_product(
        &pool,
        NewProductBuilder::new().with_price_ore(5000).with_stock(3).build(),
    )
    .await;

    let order = order::create_order(
        &pool,
        customer_id,
        &[LineRequest {
            product_id,
            quantity: 3,
        }],
    )
    .await
    .unwrap();
    assert_eq!(stock_of(&pool, product_id).await, 0);

    // A second customer loses the race for the last units...
    let other = customer::create(
        &pool,
        NewCustomerBuilder::new().with_email("ola@example.com").build(),
    )
    .await
    .unwrap();
    let err = order::create_order(
        &pool,
        other.id,
        &[LineRequest {
            product_id,
            quantity: 1,
        }],
    )
    .await
    .unwrap_err();
    assert!(matches!(err, order::OrderError::InsufficientStock { .. }));

    // ...until the first order is canceled and the stock comes back.
    order::update_status(&pool, order.id, "canceled").await.unwrap();
    assert_eq!(stock_of(&pool, product_id).await, 3);

    order::create_order(
        &pool,
        other.id,
        &[LineRequest {
            product_id,
            quantity: 1,
        }],
    )
    .await
    .unwrap();
    assert_eq!(stock_of(&pool, product_id).await, 2);
}

#[tokio::test]
async fn concurrent_orders_never_oversell() {
    let (pool, _dir) = setup_test_db_file().await;
    let product_id = insert_product(
        &pool,
        NewProductBuilder::new().with_price_ore(1000).with_stock(10).build(),
    )
    .await;

    let mut customers = Vec::new();
    for i in 0..8 {
        customers.push(
            customer::create(
                &pool,
                NewCustomerBuilder::new()
                    .with_email(&format!("c{i}@example.com"))
                    .build(),
            )
            .await
            .unwrap()
            .id,
        );
    }

    // Eight orders of 3 units race for 10 units of stock; at most
    // three can win.
    let mut handles = Vec::new();
    for customer_id in customers {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            order::create_order(
                &pool,
                customer_id,
                &[LineRequest {
                    product_id,
                    quantity: 3,
                }],
            )
            .await
        }));
    }

    let mut placed = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            placed += 1;
        }
    }

    let remaining = stock_of(&pool, product_id).await;
    assert!(remaining >= 0);
    assert_eq!(remaining, 10 - 3 * placed);
    assert!(placed <= 3);
}

#[tokio::test]
async fn bootstrap_admin_works_with_an_empty_user_table() {
    let pool = setup_test_db().await;
    let guard = Guard::new(pool.clone(), test_bootstrap_admin());

    let session = guard.login("admin", "adminpass").await.unwrap();
    let principal = guard.authenticate(&session.token).await.unwrap();

    assert_eq!(
        principal,
        Principal {
            email: "admin".to_string(),
            role: Role::Admin,
        }
    );
    assert!(guard.authorize(&principal, &Operation::ManageUsers).is_ok());
}
