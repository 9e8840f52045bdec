//! Shared test fixtures: database setup, seed helpers and builders
//! for customers and products.

use sqlx::SqlitePool;
use std::sync::atomic::{AtomicU64, Ordering};
use url::Url;

use crate::auth::BootstrapAdmin;
use crate::customer::{self, CustomerId, NewCustomer};
use crate::money::Nok;
use crate::product::{self, NewProduct, ProductId};

/// Centralized test database setup. Creates an in-memory SQLite
/// database with all migrations applied.
pub(crate) async fn setup_test_db() -> SqlitePool {
    let pool = SqlitePool::connect(":memory:").await.unwrap();
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::migrate!().run(&pool).await.unwrap();
    pool
}

/// File-backed variant for tests that exercise real cross-connection
/// concurrency; `:memory:` databases are per-connection. The returned
/// directory guard must outlive the pool.
pub(crate) async fn setup_test_db_file() -> (SqlitePool, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
    let pool = crate::config::configure_sqlite_pool(&url).await.unwrap();
    sqlx::migrate!().run(&pool).await.unwrap();
    (pool, dir)
}

pub(crate) fn test_bootstrap_admin() -> BootstrapAdmin {
    BootstrapAdmin {
        email: "admin".to_string(),
        password: "adminpass".to_string(),
    }
}

pub(crate) fn test_return_url() -> Url {
    "https://shop.example.com/payment-return".parse().unwrap()
}

/// Inserts a customer with default details and returns its id.
pub(crate) async fn insert_customer(pool: &SqlitePool) -> CustomerId {
    customer::create(pool, NewCustomerBuilder::new().build())
        .await
        .unwrap()
        .id
}

/// Inserts the given product and returns its id.
pub(crate) async fn insert_product(pool: &SqlitePool, new: NewProduct) -> ProductId {
    product::create(pool, new).await.unwrap().id
}

/// Builder for `NewCustomer` test instances with sensible defaults.
pub(crate) struct NewCustomerBuilder {
    new: NewCustomer,
}

impl NewCustomerBuilder {
    pub(crate) fn new() -> Self {
        // Emails are unique per builder so fixtures never trip the
        // duplicate-email check.
        static SEQ: AtomicU64 = AtomicU64::new(0);
        let seq = SEQ.fetch_add(1, Ordering::SeqCst);

        Self {
            new: NewCustomer {
                first_name: "Test".to_string(),
                last_name: "Kunde".to_string(),
                email: format!("test.kunde{seq}@example.com"),
                phone: Some("+4790000000".to_string()),
                address: Some("Testveien 1".to_string()),
                city: Some("Oslo".to_string()),
                postal_code: Some("0001".to_string()),
                country: Some("Norway".to_string()),
            },
        }
    }

    pub(crate) fn with_email(mut self, email: &str) -> Self {
        self.new.email = email.to_string();
        self
    }

    pub(crate) fn with_name(mut self, first: &str, last: &str) -> Self {
        self.new.first_name = first.to_string();
        self.new.last_name = last.to_string();
        self
    }

    pub(crate) fn build(self) -> NewCustomer {
        self.new
    }
}

/// Builder for `NewProduct` test instances with sensible defaults.
pub(crate) struct NewProductBuilder {
    new: NewProduct,
}

impl NewProductBuilder {
    pub(crate) fn new() -> Self {
        Self {
            new: NewProduct {
                name: "Testprodukt".to_string(),
                description: Some("Product for tests".to_string()),
                price: Nok::from_ore(1000).unwrap(),
                stock: 5,
            },
        }
    }

    pub(crate) fn with_name(mut self, name: &str) -> Self {
        self.new.name = name.to_string();
        self
    }

    pub(crate) fn with_price_ore(mut self, ore: i64) -> Self {
        self.new.price = Nok::from_ore(ore).unwrap();
        self
    }

    pub(crate) fn with_stock(mut self, stock: i64) -> Self {
        self.new.stock = stock;
        self
    }

    pub(crate) fn build(self) -> NewProduct {
        self.new
    }
}
