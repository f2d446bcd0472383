//! PayPal Orders v2 client
//!
//! OAuth client-credentials token, then create-order / capture-order.
//! The sandbox and live hosts differ only in the base URL.

use serde::Deserialize;
use serde_json::json;

use casehub_common::config::PaypalConfig;
use casehub_common::{Error, Result};

const SANDBOX_BASE: &str = "https://api-m.sandbox.paypal.com";
const LIVE_BASE: &str = "https://api-m.paypal.com";

#[derive(Debug, Deserialize)]
struct OauthToken {
    access_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaypalLink {
    pub href: String,
    pub rel: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaypalOrder {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub links: Vec<PaypalLink>,
}

impl PaypalOrder {
    /// Approval URL the buyer is redirected to
    pub fn approve_link(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|l| l.rel == "approve")
            .map(|l| l.href.as_str())
    }
}

#[derive(Clone)]
pub struct PaypalClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    base_url: String,
}

impl PaypalClient {
    pub fn new(config: &PaypalConfig) -> PaypalClient {
        let base_url = if config.mode == "live" {
            LIVE_BASE.to_string()
        } else {
            SANDBOX_BASE.to_string()
        };
        PaypalClient {
            http: reqwest::Client::new(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            base_url,
        }
    }

    async fn access_token(&self) -> Result<String> {
        let response = self
            .http
            .post(format!("{}/v1/oauth2/token", self.base_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| Error::Payment(format!("PayPal auth failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Payment(format!(
                "PayPal auth rejected with {}",
                response.status()
            )));
        }

        let token: OauthToken = response
            .json()
            .await
            .map_err(|e| Error::Payment(format!("malformed PayPal token response: {}", e)))?;
        Ok(token.access_token)
    }

    /// Create a CAPTURE order for one purchase unit. `amount` is in the
    /// major currency unit ("12.00"). The buyer is sent back to our
    /// return/cancel URLs after approval.
    pub async fn create_order(
        &self,
        amount: &str,
        currency: &str,
        reference_id: &str,
        return_url: &str,
        cancel_url: &str,
    ) -> Result<PaypalOrder> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(format!("{}/v2/checkout/orders", self.base_url))
            .bearer_auth(&token)
            .json(&json!({
                "intent": "CAPTURE",
                "purchase_units": [{
                    "reference_id": reference_id,
                    "amount": { "currency_code": currency, "value": amount },
                }],
                "application_context": {
                    "return_url": return_url,
                    "cancel_url": cancel_url,
                },
            }))
            .send()
            .await
            .map_err(|e| {
                tracing::error!("PayPal order creation failed: {}", e);
                Error::Payment(format!("order creation failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!("PayPal order rejected ({}): {}", status, body);
            return Err(Error::Payment(format!("order rejected with {}", status)));
        }

        response
            .json::<PaypalOrder>()
            .await
            .map_err(|e| Error::Payment(format!("malformed order response: {}", e)))
    }

    /// Capture an approved order; status "COMPLETED" means paid
    pub async fn capture_order(&self, order_id: &str) -> Result<PaypalOrder> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(format!(
                "{}/v2/checkout/orders/{}/capture",
                self.base_url, order_id
            ))
            .bearer_auth(&token)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| Error::Payment(format!("capture failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Payment(format!(
                "capture rejected with {}",
                response.status()
            )));
        }

        response
            .json::<PaypalOrder>()
            .await
            .map_err(|e| Error::Payment(format!("malformed capture response: {}", e)))
    }
}
