//! Blockchain Port
//!
//! Fire-and-forget notarization of loans, repayments, vouch stakes and trust
//! score changes. The core never blocks on these calls and treats every
//! failure as non-fatal; dispatch happens through the background task
//! manager, with the resulting tx hash written back when it arrives.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::EngineError;

#[async_trait]
pub trait BlockchainClient: Send + Sync {
    fn is_configured(&self) -> bool;

    async fn record_loan(
        &self,
        loan_id: Uuid,
        borrower_wallet: &str,
        amount: u64,
        tenure_days: u32,
    ) -> Result<Option<String>, EngineError>;

    async fn record_repayment(&self, loan_id: Uuid, amount: u64)
        -> Result<Option<String>, EngineError>;

    async fn stake_for_vouch(
        &self,
        voucher_wallet: &str,
        vouchee_wallet: &str,
        amount: u64,
    ) -> Result<Option<String>, EngineError>;

    async fn update_trust_score(
        &self,
        wallet: &str,
        new_score: i64,
        reason: &str,
    ) -> Result<Option<String>, EngineError>;
}

/// Deterministic stand-in ledger: tx hashes are digests of the notarized
/// payload. Used for tests and environments without an RPC endpoint.
pub struct SimulatedLedger {
    configured: bool,
}

impl SimulatedLedger {
    pub fn new() -> Self {
        Self { configured: true }
    }

    pub fn unconfigured() -> Self {
        Self { configured: false }
    }

    fn pseudo_hash(parts: &[&str]) -> String {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part.as_bytes());
            hasher.update(b"|");
        }
        format!("0x{}", hex::encode(hasher.finalize()))
    }
}

impl Default for SimulatedLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlockchainClient for SimulatedLedger {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn record_loan(
        &self,
        loan_id: Uuid,
        borrower_wallet: &str,
        amount: u64,
        tenure_days: u32,
    ) -> Result<Option<String>, EngineError> {
        if !self.configured {
            return Ok(None);
        }
        Ok(Some(Self::pseudo_hash(&[
            "loan",
            &loan_id.to_string(),
            borrower_wallet,
            &amount.to_string(),
            &tenure_days.to_string(),
        ])))
    }

    async fn record_repayment(
        &self,
        loan_id: Uuid,
        amount: u64,
    ) -> Result<Option<String>, EngineError> {
        if !self.configured {
            return Ok(None);
        }
        Ok(Some(Self::pseudo_hash(&[
            "repayment",
            &loan_id.to_string(),
            &amount.to_string(),
        ])))
    }

    async fn stake_for_vouch(
        &self,
        voucher_wallet: &str,
        vouchee_wallet: &str,
        amount: u64,
    ) -> Result<Option<String>, EngineError> {
        if !self.configured {
            return Ok(None);
        }
        Ok(Some(Self::pseudo_hash(&[
            "vouch",
            voucher_wallet,
            vouchee_wallet,
            &amount.to_string(),
        ])))
    }

    async fn update_trust_score(
        &self,
        wallet: &str,
        new_score: i64,
        reason: &str,
    ) -> Result<Option<String>, EngineError> {
        if !self.configured {
            return Ok(None);
        }
        Ok(Some(Self::pseudo_hash(&[
            "trust",
            wallet,
            &new_score.to_string(),
            reason,
        ])))
    }
}
