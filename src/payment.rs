//! Payment providers and the order payment workflow.
//!
//! Providers are reached through the [`PaymentProvider`] trait so the
//! initiation flow and the callback reconciler stay independent of
//! which gateway is configured. The provider call happens outside any
//! order transaction: an order only becomes `paid` through a
//! reconciled callback, never because initiation succeeded.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::fmt::Display;
use tracing::info;
use url::Url;

use crate::money::Nok;
use crate::order::{self, OrderError, OrderId, OrderStatus};

mod mock;
mod reconciler;
mod stripe;
mod vipps;

pub use mock::MockProvider;
pub use reconciler::handle_callback;
pub use stripe::{StripeClient, StripeError};
pub use vipps::{VippsClient, VippsError};

/// Smallest order a provider will accept, in øre (20.00 NOK).
pub const MINIMUM_ORDER_ORE: i64 = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportedProvider {
    Vipps,
    Stripe,
    Mock,
}

impl Display for SupportedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vipps => write!(f, "vipps"),
            Self::Stripe => write!(f, "stripe"),
            Self::Mock => write!(f, "mock"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid payment provider: {0}")]
pub struct InvalidProviderError(String);

impl std::str::FromStr for SupportedProvider {
    type Err = InvalidProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vipps" => Ok(Self::Vipps),
            "stripe" => Ok(Self::Stripe),
            "mock" => Ok(Self::Mock),
            _ => Err(InvalidProviderError(s.to_string())),
        }
    }
}

/// What a provider needs to start a payment.
#[derive(Debug, Clone)]
pub struct PaymentOrder {
    pub order_id: OrderId,
    pub amount: Nok,
    /// Provider-facing reference, 8-64 characters, alphanumeric and
    /// dashes.
    pub reference: String,
    pub return_url: Url,
    pub description: String,
}

/// Redirect handle returned by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSession {
    pub reference: String,
    pub redirect_url: Url,
}

/// Outbound payment gateway seam.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Registers a payment with the gateway and returns where to send
    /// the customer.
    async fn create_payment(&self, order: &PaymentOrder) -> Result<PaymentSession, Self::Error>;

    /// The enum variant representing this provider, used for
    /// persistence and logging.
    fn to_supported_provider(&self) -> SupportedProvider;
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),
    #[error("Order is not pending payment (status: {0})")]
    NotPending(OrderStatus),
    #[error("Order amount must be at least {minimum} NOK, got {total}")]
    BelowMinimum { total: Nok, minimum: Nok },
    #[error("Payment provider error: {0}")]
    Provider(Box<dyn std::error::Error + Send + Sync>),
    #[error("Order error: {0}")]
    Order(#[from] OrderError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Starts payment for a pending order.
///
/// The order itself is untouched: a failed provider call surfaces as
/// an error and leaves the order pending, and a successful one merely
/// records the request. Status only moves when the provider calls
/// back.
#[tracing::instrument(
    skip(pool, provider, return_url),
    fields(provider = %provider.to_supported_provider()),
    level = tracing::Level::INFO
)]
pub async fn initiate<P: PaymentProvider>(
    pool: &SqlitePool,
    provider: &P,
    order_id: OrderId,
    return_url: &Url,
) -> Result<PaymentSession, PaymentError> {
    let order = order::find_by_id(pool, order_id)
        .await?
        .ok_or(PaymentError::OrderNotFound(order_id))?;

    if order.status != OrderStatus::Pending {
        return Err(PaymentError::NotPending(order.status));
    }
    if order.total.as_ore() < MINIMUM_ORDER_ORE {
        return Err(PaymentError::BelowMinimum {
            total: order.total,
            minimum: Nok::from_ore(MINIMUM_ORDER_ORE)?,
        });
    }

    let payment_order = PaymentOrder {
        order_id,
        amount: order.total,
        reference: payment_reference(order_id),
        return_url: return_url.clone(),
        description: format!("Payment for order {order_id}"),
    };

    let session = provider
        .create_payment(&payment_order)
        .await
        .map_err(|e| PaymentError::Provider(Box::new(e)))?;

    sqlx::query(
        "INSERT INTO payment_requests (order_id, provider, reference, redirect_url, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(order_id)
    .bind(provider.to_supported_provider().to_string())
    .bind(&session.reference)
    .bind(session.redirect_url.as_str())
    .bind(Utc::now())
    .execute(pool)
    .await?;

    info!(
        order_id = %order_id,
        reference = %session.reference,
        "Payment initiated"
    );

    Ok(session)
}

impl From<crate::money::InvalidAmountError> for PaymentError {
    fn from(err: crate::money::InvalidAmountError) -> Self {
        Self::Order(OrderError::Amount(err))
    }
}

/// Provider-facing reference for an order. Zero-padded so it always
/// clears the 8-character floor providers impose.
fn payment_reference(order_id: OrderId) -> String {
    format!("webshop-order-{:08}", order_id.value())
}
