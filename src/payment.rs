//! Payment gateway integration.
//!
//! The gateway is asked to create an order for the amount due; after the
//! shopper pays, the client posts back the gateway order id, the payment id
//! and a signature. The signature is HMAC-SHA256 over
//! `"<order_id>|<payment_id>"` keyed with the account secret.

use crate::config::GatewayConfig;
use crate::error::{Result, StoreError};
use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn payment_mac(secret: &str, order_id: &str, payment_id: &str) -> HmacSha256 {
    // HMAC accepts keys of any length
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("hmac key of any size is valid"));
    mac.update(order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());
    mac
}

/// Hex signature the gateway produces for a completed payment.
pub fn sign_payment(secret: &str, order_id: &str, payment_id: &str) -> String {
    hex::encode(payment_mac(secret, order_id, payment_id).finalize().into_bytes())
}

const SIGNATURE_HEX_LEN: usize = 64;

/// Checks a client supplied signature in constant time. Only the exact
/// lower-case hex form `sign_payment` produces is accepted.
pub fn verify_signature(secret: &str, order_id: &str, payment_id: &str, signature: &str) -> bool {
    let canonical = signature.len() == SIGNATURE_HEX_LEN
        && signature.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
    if !canonical {
        return false;
    }
    let Ok(provided) = hex::decode(signature) else {
        return false;
    };
    payment_mac(secret, order_id, payment_id)
        .verify_slice(&provided)
        .is_ok()
}

/// Converts a major-unit amount (rupees, dollars) to the minor units the
/// gateway expects.
pub fn to_minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub receipt: Option<String>,
    pub status: String,
}

pub trait PaymentGateway {
    fn create_order(&self, amount_minor: i64, currency: &str, receipt: &str) -> Result<GatewayOrder>;
}

#[derive(Serialize)]
struct CreateOrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
}

/// Razorpay orders API over a blocking HTTP client.
pub struct RazorpayGateway<'a> {
    config: &'a GatewayConfig,
    client: reqwest::blocking::Client,
}

impl<'a> RazorpayGateway<'a> {
    pub fn new(config: &'a GatewayConfig) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        Self { config, client }
    }
}

impl PaymentGateway for RazorpayGateway<'_> {
    fn create_order(&self, amount_minor: i64, currency: &str, receipt: &str) -> Result<GatewayOrder> {
        let url = format!("{}/orders", self.config.api_base.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .basic_auth(
                &self.config.key_id,
                Some(self.config.key_secret.expose_secret()),
            )
            .json(&CreateOrderBody {
                amount: amount_minor,
                currency,
                receipt,
            })
            .send()
            .map_err(|e| StoreError::Gateway(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(StoreError::Gateway(format!("{status}: {body}")));
        }

        response
            .json::<GatewayOrder>()
            .map_err(|e| StoreError::Gateway(format!("unexpected response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test_key_secret";

    #[test]
    fn correct_signature_verifies() {
        let sig = sign_payment(SECRET, "order_9A33XWu170gUtm", "pay_29QQoUBi66xm2f");
        assert_eq!(sig.len(), 64);
        assert!(verify_signature(SECRET, "order_9A33XWu170gUtm", "pay_29QQoUBi66xm2f", &sig));
    }

    #[test]
    fn any_single_character_mutation_fails() {
        let sig = sign_payment(SECRET, "order_1", "pay_1");

        for i in 0..sig.len() {
            let mut bytes = sig.clone().into_bytes();
            bytes[i] = if bytes[i] == b'0' { b'1' } else { b'0' };
            let mutated = String::from_utf8(bytes).unwrap();
            assert!(
                !verify_signature(SECRET, "order_1", "pay_1", &mutated),
                "mutation at {i} verified"
            );
        }
    }

    #[test]
    fn case_or_whitespace_change_fails() {
        let sig = sign_payment(SECRET, "order_1", "pay_1");

        for (i, c) in sig.char_indices().filter(|(_, c)| c.is_ascii_alphabetic()) {
            let mut upper = sig.clone();
            upper.replace_range(i..i + 1, &c.to_ascii_uppercase().to_string());
            assert!(
                !verify_signature(SECRET, "order_1", "pay_1", &upper),
                "upper-cased {c} at {i} verified"
            );
        }

        assert!(!verify_signature(SECRET, "order_1", "pay_1", &format!(" {sig}")));
        assert!(!verify_signature(SECRET, "order_1", "pay_1", &format!("{sig}\n")));
        assert!(!verify_signature(SECRET, "order_1", "pay_1", &sig.to_uppercase()));
    }

    #[test]
    fn wrong_secret_or_swapped_ids_fail() {
        let sig = sign_payment(SECRET, "order_1", "pay_1");
        assert!(!verify_signature("other", "order_1", "pay_1", &sig));
        assert!(!verify_signature(SECRET, "pay_1", "order_1", &sig));
        assert!(!verify_signature(SECRET, "order_2", "pay_1", &sig));
    }

    #[test]
    fn non_hex_signature_fails() {
        assert!(!verify_signature(SECRET, "order_1", "pay_1", "not-a-signature"));
        assert!(!verify_signature(SECRET, "order_1", "pay_1", ""));
    }

    #[test]
    fn signature_matches_plain_hmac_of_joined_ids() {
        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(b"order_1|pay_1");
        let expected = hex::encode(mac.finalize().into_bytes());
        assert_eq!(sign_payment(SECRET, "order_1", "pay_1"), expected);
    }

    #[test]
    fn minor_units_round() {
        assert_eq!(to_minor_units(499.99), 49999);
        assert_eq!(to_minor_units(0.1 + 0.2), 30);
        assert_eq!(to_minor_units(1000.0), 100000);
    }
}
