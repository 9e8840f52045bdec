//! Vipps ePayment client.
//!
//! Two-step flow: fetch an access token with the header-based
//! credential scheme Vipps uses, then register the payment and hand
//! back the wallet redirect URL.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use url::Url;
use uuid::Uuid;

use super::{PaymentOrder, PaymentProvider, PaymentSession, SupportedProvider};
use crate::config::VippsAuth;

const DEFAULT_BASE_URL: &str = "https://api.vipps.no";
const SYSTEM_NAME: &str = "webshop";
const SYSTEM_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, thiserror::Error)]
pub enum VippsError {
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error("Vipps API error (status {status}): {message}")]
    Api { status: StatusCode, message: String },
    #[error("Invalid base URL: {0}")]
    BaseUrl(#[from] url::ParseError),
}

pub struct VippsClient {
    client: Client,
    base_url: Url,
    auth: VippsAuth,
}

impl VippsClient {
    pub fn new(auth: VippsAuth) -> Result<Self, VippsError> {
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

    /// Vipps access tokens are short-lived; one is fetched per
    /// payment registration rather than cached.
    async fn fetch_access_token(&self) -> Result<String, VippsError> {
        #[derive(Deserialize)]
        struct TokenResponse {
            // The field name differs between API generations.
            #[serde(alias = "accessToken")]
            access_token: String,
        }

        let url = endpoint(&self.base_url, "accesstoken/get")?;

        let response = self
            .client
            .post(url)
            .header("client_id", &self.auth.client_id)
            .header("client_secret", &self.auth.client_secret)
            .header("Ocp-Apim-Subscription-Key", &self.auth.subscription_key)
            .header("Merchant-Serial-Number", &self.auth.merchant_serial_number)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl PaymentProvider for VippsClient {
    type Error = VippsError;

    async fn create_payment(&self, order: &PaymentOrder) -> Result<PaymentSession, Self::Error> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct CreatePaymentResponse {
            redirect_url: Url,
            reference: String,
        }

        let access_token = self.fetch_access_token().await?;
        let url = endpoint(&self.base_url, "epayment/v1/payments")?;

        let body = json!({
            "amount": { "currency": "NOK", "value": order.amount.as_ore() },
            "paymentMethod": { "type": "WALLET" },
            "reference": order.reference,
            "returnUrl": order.return_url,
            "userFlow": "WEB_REDIRECT",
            "paymentDescription": order.description,
        });

        let response = self
            .client
            .post(url)
            .bearer_auth(&access_token)
            .header("Ocp-Apim-Subscription-Key", &self.auth.subscription_key)
            .header("Merchant-Serial-Number", &self.auth.merchant_serial_number)
            .header("Vipps-System-Name", SYSTEM_NAME)
            .header("Vipps-System-Version", SYSTEM_VERSION)
            .header("Idempotency-Key", Uuid::new_v4().to_string())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let created: CreatePaymentResponse = response.json().await?;

        Ok(PaymentSession {
            reference: created.reference,
            redirect_url: created.redirect_url,
        })
    }

    fn to_supported_provider(&self) -> SupportedProvider {
        SupportedProvider::Vipps
    }
}

fn endpoint(base_url: &Url, path: &str) -> Result<Url, VippsError> {
    Ok(base_url.join(path)?)
}

async fn api_error(response: reqwest::Response) -> VippsError {
    let status = response.status();
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    VippsError::Api { status, message }
}
