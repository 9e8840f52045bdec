//! Stripe Checkout client.
//!
//! Creates a Checkout Session for the whole order as a single line
//! item, mirroring the Vipps flow: the caller gets a redirect URL and
//! the session id as the provider reference.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use url::Url;

use super::{PaymentOrder, PaymentProvider, PaymentSession, SupportedProvider};
use crate::config::StripeAuth;

const DEFAULT_BASE_URL: &str = "https://api.stripe.com";

#[derive(Debug, thiserror::Error)]
pub enum StripeError {
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error("Stripe API error (status {status}): {message}")]
    Api { status: StatusCode, message: String },
    #[error("Invalid base URL: {0}")]
    BaseUrl(#[from] url::ParseError),
}

pub struct StripeClient {
    client: Client,
    base_url: Url,
    auth: StripeAuth,
}

impl StripeClient {
    pub fn new(auth: StripeAuth) -> Result<Self, StripeError> {
        let base_url = match &auth.api_base_url {
            Some(url) => url.clone(),
            None => DEFAULT_BASE_URL.parse()?,
        };

        Ok(Self {
            client: Client::new(),
            base_url,
            auth,
        })
    }
}

#[async_trait]
impl PaymentProvider for StripeClient {
    type Error = StripeError;

    async fn create_payment(&self, order: &PaymentOrder) -> Result<PaymentSession, Self::Error> {
        #[derive(Deserialize)]
        struct CheckoutSessionResponse {
            id: String,
            url: Url,
        }

        let url = self.base_url.join("v1/checkout/sessions")?;

        let amount_ore = order.amount.as_ore().to_string();
        let product_name = format!("Order #{}", order.order_id);
        let success_url = format!(
            "{}?session_id={{CHECKOUT_SESSION_ID}}&order_id={}",
            order.return_url, order.order_id
        );
        let cancel_url = format!("{}?canceled=1&order_id={}", order.return_url, order.order_id);
        let order_id = order.order_id.to_string();

        let form: &[(&str, &str)] = &[
            ("mode", "payment"),
            ("payment_method_types[0]", "card"),
            ("line_items[0][price_data][currency]", "nok"),
            ("line_items[0][price_data][product_data][name]", &product_name),
            (
                "line_items[0][price_data][product_data][description]",
                &order.description,
            ),
            ("line_items[0][price_data][unit_amount]", &amount_ore),
            ("line_items[0][quantity]", "1"),
            ("success_url", &success_url),
            ("cancel_url", &cancel_url),
            ("client_reference_id", &order.reference),
            ("metadata[order_id]", &order_id),
        ];

        let response = self
            .client
            .post(url)
            .basic_auth(&self.auth.secret_key, None::<&str>)
            .form(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(StripeError::Api { status, message });
        }

        let session: CheckoutSessionResponse = response.json().await?;

        Ok(PaymentSession {
            reference: session.id,
            redirect_url: session.url,
        })
    }

    fn to_supported_provider(&self) -> SupportedProvider {
        SupportedProvider::Stripe
    }
}
