//! Payments Port
//!
//! Checkout sessions, UPI payouts, and webhook signature verification for
//! the payment gateway. Amounts cross the wire in paise.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::Sha256;
use std::time::Duration;
use tracing::warn;

use crate::error::EngineError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub checkout_id: String,
    pub checkout_url: String,
    pub simulated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payout {
    pub payout_id: String,
    pub status: String,
}

#[async_trait]
pub trait PaymentsClient: Send + Sync {
    async fn create_checkout_session(
        &self,
        amount: f64,
        description: &str,
        customer_phone: Option<&str>,
        metadata: Value,
    ) -> Result<CheckoutSession, EngineError>;

    async fn create_payout(
        &self,
        amount: f64,
        recipient_upi_id: &str,
        recipient_name: &str,
        metadata: Value,
    ) -> Result<Payout, EngineError>;
}

/// HMAC-SHA256 webhook verification over the raw request body with a
/// constant-time comparison.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn verify(&self, payload: &[u8], signature_hex: &str) -> bool {
        let Ok(signature) = hex::decode(signature_hex.trim()) else {
            return false;
        };
        let mut mac = match HmacSha256::new_from_slice(self.secret.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => return false,
        };
        mac.update(payload);
        mac.verify_slice(&signature).is_ok()
    }

    pub fn sign(&self, payload: &[u8]) -> String {
        let mut mac =
            HmacSha256::new_from_slice(self.secret.as_bytes()).expect("hmac accepts any key size");
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }
}

/// Production payment gateway client.
pub struct DodoClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl DodoClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, EngineError> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(30))
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::DependencyFailure {
                name: "payments",
                reason: e.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(EngineError::DependencyFailure {
                name: "payments",
                reason: format!("gateway returned {}", response.status()),
            });
        }
        response
            .json()
            .await
            .map_err(|e| EngineError::DependencyFailure {
                name: "payments",
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl PaymentsClient for DodoClient {
    async fn create_checkout_session(
        &self,
        amount: f64,
        description: &str,
        customer_phone: Option<&str>,
        metadata: Value,
    ) -> Result<CheckoutSession, EngineError> {
        let mut payload = json!({
            "amount": (amount * 100.0).round() as i64,
            "currency": "INR",
            "product": { "name": "Loan EMI Repayment", "description": description },
            "metadata": metadata,
        });
        if let Some(phone) = customer_phone {
            payload["customer"] = json!({ "phone": phone });
        }

        let data = self.post("checkout", payload).await?;
        Ok(CheckoutSession {
            checkout_id: data["id"].as_str().unwrap_or_default().to_string(),
            checkout_url: data["url"]
                .as_str()
                .or_else(|| data["checkout_url"].as_str())
                .unwrap_or_default()
                .to_string(),
            simulated: false,
        })
    }

    async fn create_payout(
        &self,
        amount: f64,
        recipient_upi_id: &str,
        recipient_name: &str,
        metadata: Value,
    ) -> Result<Payout, EngineError> {
        let payload = json!({
            "amount": (amount * 100.0).round() as i64,
            "currency": "INR",
            "recipient": {
                "type": "upi",
                "upi_id": recipient_upi_id,
                "name": recipient_name,
            },
            "metadata": metadata,
        });

        let data = self.post("payouts", payload).await?;
        Ok(Payout {
            payout_id: data["id"].as_str().unwrap_or_default().to_string(),
            status: data["status"].as_str().unwrap_or("pending").to_string(),
        })
    }
}

/// Stand-in gateway for tests and environments without credentials.
pub struct SimulatedPayments;

#[async_trait]
impl PaymentsClient for SimulatedPayments {
    async fn create_checkout_session(
        &self,
        amount: f64,
        _description: &str,
        _customer_phone: Option<&str>,
        _metadata: Value,
    ) -> Result<CheckoutSession, EngineError> {
        warn!("payments not configured, simulating checkout session");
        Ok(CheckoutSession {
            checkout_id: format!("sim_check_{}", uuid::Uuid::new_v4().simple()),
            checkout_url: format!("https://example.invalid/checkout?simulated=true&amount={amount}"),
            simulated: true,
        })
    }

    async fn create_payout(
        &self,
        _amount: f64,
        _recipient_upi_id: &str,
        _recipient_name: &str,
        _metadata: Value,
    ) -> Result<Payout, EngineError> {
        Ok(Payout {
            payout_id: format!("sim_payout_{}", uuid::Uuid::new_v4().simple()),
            status: "completed".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_round_trip() {
        let verifier = WebhookVerifier::new("whsec_test");
        let payload = br#"{"type":"payment.completed","data":{"id":"p-42"}}"#;
        let signature = verifier.sign(payload);
        assert!(verifier.verify(payload, &signature));
    }

    #[test]
    fn test_webhook_rejects_mutated_body() {
        let verifier = WebhookVerifier::new("whsec_test");
        let payload = br#"{"amount":55000}"#;
        let signature = verifier.sign(payload);
        let mutated = br#"{"amount":99000}"#;
        assert!(!verifier.verify(mutated, &signature));
    }

    #[test]
    fn test_webhook_rejects_garbage_signature() {
        let verifier = WebhookVerifier::new("whsec_test");
        assert!(!verifier.verify(b"{}", "not-hex"));
        assert!(!verifier.verify(b"{}", "deadbeef"));
    }

    #[test]
    fn test_wrong_secret_fails() {
        let signer = WebhookVerifier::new("secret-a");
        let verifier = WebhookVerifier::new("secret-b");
        let payload = b"payload";
        assert!(!verifier.verify(payload, &signer.sign(payload)));
    }
}
