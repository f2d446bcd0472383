//! Razorpay REST client and signature checks
//!
//! Order creation and payment lookup go over HTTPS with basic auth
//! (key id / key secret). Checkout and webhook verification are pure
//! HMAC-SHA256 computations and need no network.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;

use casehub_common::config::RazorpayConfig;
use casehub_common::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

const API_BASE: &str = "https://api.razorpay.com/v1";

#[derive(Debug, Clone, Deserialize)]
pub struct RazorpayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RazorpayPayment {
    pub id: String,
    pub order_id: String,
    pub status: String,
    pub amount: i64,
    #[serde(default)]
    pub method: Option<String>,
}

#[derive(Clone)]
pub struct RazorpayClient {
    http: reqwest::Client,
    key_id: String,
    key_secret: String,
}

impl RazorpayClient {
    pub fn new(config: &RazorpayConfig) -> RazorpayClient {
        RazorpayClient {
            http: reqwest::Client::new(),
            key_id: config.key_id.clone(),
            key_secret: config.key_secret.clone(),
        }
    }

    /// Create an order. `amount` is in paise, `receipt` ties the order
    /// back to our transaction row.
    pub async fn create_order(
        &self,
        amount: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<RazorpayOrder> {
        let response = self
            .http
            .post(format!("{}/orders", API_BASE))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&json!({
                "amount": amount,
                "currency": currency,
                "receipt": receipt,
            }))
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Razorpay order creation failed: {}", e);
                Error::Payment(format!("order creation failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Razorpay order rejected ({}): {}", status, body);
            return Err(Error::Payment(format!("order rejected with {}", status)));
        }

        response
            .json::<RazorpayOrder>()
            .await
            .map_err(|e| Error::Payment(format!("malformed order response: {}", e)))
    }

    pub async fn fetch_payment(&self, payment_id: &str) -> Result<RazorpayPayment> {
        let response = self
            .http
            .get(format!("{}/payments/{}", API_BASE, payment_id))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await
            .map_err(|e| Error::Payment(format!("payment lookup failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Payment(format!(
                "payment lookup rejected with {}",
                response.status()
            )));
        }

        response
            .json::<RazorpayPayment>()
            .await
            .map_err(|e| Error::Payment(format!("malformed payment response: {}", e)))
    }
}

/// Checkout callback signature: hex HMAC-SHA256 of "order_id|payment_id"
/// under the key secret. Comparison is constant-time via the Mac verify.
pub fn verify_checkout_signature(
    key_secret: &str,
    order_id: &str,
    payment_id: &str,
    signature: &str,
) -> bool {
    let payload = format!("{}|{}", order_id, payment_id);
    verify_hex_hmac(key_secret, payload.as_bytes(), signature)
}

/// Webhook signature: hex HMAC-SHA256 of the raw request body under the
/// webhook secret (X-Razorpay-Signature header)
pub fn verify_webhook_signature(webhook_secret: &str, body: &[u8], signature: &str) -> bool {
    verify_hex_hmac(webhook_secret, body, signature)
}

fn verify_hex_hmac(secret: &str, message: &[u8], signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(message);
    mac.verify_slice(&signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, message: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(message);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_checkout_signature_roundtrip() {
        let secret = "test_secret";
        let signature = sign(secret, b"order_abc|pay_xyz");
        assert!(verify_checkout_signature(
            secret, "order_abc", "pay_xyz", &signature
        ));
    }

    #[test]
    fn test_checkout_signature_rejects_swapped_ids() {
        let secret = "test_secret";
        let signature = sign(secret, b"order_abc|pay_xyz");
        assert!(!verify_checkout_signature(
            secret, "pay_xyz", "order_abc", &signature
        ));
    }

    #[test]
    fn test_checkout_signature_rejects_wrong_secret() {
        let signature = sign("secret_a", b"order_abc|pay_xyz");
        assert!(!verify_checkout_signature(
            "secret_b", "order_abc", "pay_xyz", &signature
        ));
    }

    #[test]
    fn test_webhook_signature_roundtrip() {
        let body = br#"{"event":"payment.captured"}"#;
        let signature = sign("hook_secret", body);
        assert!(verify_webhook_signature("hook_secret", body, &signature));
        assert!(!verify_webhook_signature("hook_secret", b"tampered", &signature));
    }

    #[test]
    fn test_non_hex_signature_rejected() {
        assert!(!verify_webhook_signature("s", b"body", "not-hex!"));
    }
}
