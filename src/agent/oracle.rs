//! Oracle Signing
//!
//! Deterministic serialization plus a keyed digest over the risk oracle's
//! core fields. Without a signing key the payload degrades to a plain
//! SHA-256 digest, flagged explicitly so consumers never mistake one for
//! the other.

use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OracleSignature {
    pub signature: String,
    pub signed: bool,
}

#[derive(Clone)]
pub struct OracleSigner {
    signing_key: Option<String>,
}

impl OracleSigner {
    pub fn new(signing_key: Option<String>) -> Self {
        Self { signing_key }
    }

    /// Canonical JSON of the signable fields, keys sorted.
    fn canonical(risk_score: i64, category: &str, max_loan: i64, timestamp: &str) -> String {
        let mut fields: BTreeMap<&str, Value> = BTreeMap::new();
        fields.insert("category", Value::from(category));
        fields.insert("max_loan", Value::from(max_loan));
        fields.insert("risk_score", Value::from(risk_score));
        fields.insert("timestamp", Value::from(timestamp));
        serde_json::to_string(&fields).expect("canonical oracle fields serialize")
    }

    pub fn digest(risk_score: i64, category: &str, max_loan: i64, timestamp: &str) -> String {
        let message = Self::canonical(risk_score, category, max_loan, timestamp);
        hex::encode(Sha256::digest(message.as_bytes()))
    }

    pub fn sign(
        &self,
        risk_score: i64,
        category: &str,
        max_loan: i64,
        timestamp: &str,
    ) -> OracleSignature {
        let digest = Self::digest(risk_score, category, max_loan, timestamp);
        match self.signing_key {
            Some(ref key) => {
                let mut mac = HmacSha256::new_from_slice(key.as_bytes())
                    .expect("hmac accepts any key size");
                mac.update(digest.as_bytes());
                OracleSignature {
                    signature: hex::encode(mac.finalize().into_bytes()),
                    signed: true,
                }
            }
            None => OracleSignature {
                signature: digest,
                signed: false,
            },
        }
    }

    /// Verify a signature produced by `sign` with the same key configuration.
    pub fn verify(
        &self,
        risk_score: i64,
        category: &str,
        max_loan: i64,
        timestamp: &str,
        signature: &str,
    ) -> bool {
        let expected = self.sign(risk_score, category, max_loan, timestamp);
        match (self.signing_key.as_ref(), expected.signed) {
            (Some(key), true) => {
                let digest = Self::digest(risk_score, category, max_loan, timestamp);
                let mut mac = HmacSha256::new_from_slice(key.as_bytes())
                    .expect("hmac accepts any key size");
                mac.update(digest.as_bytes());
                match hex::decode(signature) {
                    Ok(sig) => mac.verify_slice(&sig).is_ok(),
                    Err(_) => false,
                }
            }
            _ => expected.signature == signature,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TS: &str = "2026-08-01T10:00:00Z";

    #[test]
    fn test_digest_is_deterministic() {
        let a = OracleSigner::digest(7200, "MODERATE_RISK", 25000, TS);
        let b = OracleSigner::digest(7200, "MODERATE_RISK", 25000, TS);
        assert_eq!(a, b);
        assert_ne!(a, OracleSigner::digest(7201, "MODERATE_RISK", 25000, TS));
    }

    #[test]
    fn test_keyed_signature_round_trip() {
        let signer = OracleSigner::new(Some("oracle-key".into()));
        let sig = signer.sign(8100, "LOW_RISK", 50000, TS);
        assert!(sig.signed);
        assert!(signer.verify(8100, "LOW_RISK", 50000, TS, &sig.signature));
        // Tampered fields fail verification.
        assert!(!signer.verify(8100, "LOW_RISK", 49000, TS, &sig.signature));
    }

    #[test]
    fn test_wrong_key_fails_verification() {
        let signer = OracleSigner::new(Some("key-a".into()));
        let other = OracleSigner::new(Some("key-b".into()));
        let sig = signer.sign(4000, "ELEVATED_RISK", 10000, TS);
        assert!(!other.verify(4000, "ELEVATED_RISK", 10000, TS, &sig.signature));
    }

    #[test]
    fn test_unkeyed_degrades_to_plain_digest() {
        let signer = OracleSigner::new(None);
        let sig = signer.sign(3000, "HIGH_RISK", 5000, TS);
        assert!(!sig.signed);
        assert_eq!(
            sig.signature,
            OracleSigner::digest(3000, "HIGH_RISK", 5000, TS)
        );
        assert!(signer.verify(3000, "HIGH_RISK", 5000, TS, &sig.signature));
    }
}
