//! Vouching Domain Service
//!
//! Stake-to-vouch with every side effect: debit the voucher, record the
//! vouch, lift the vouchee's trust, log the stake, and notarize on chain in
//! the background. Store writes are not transactional at the port, so any
//! failure after the debit triggers a compensating credit plus a
//! reconciliation record.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{
    SaathiTransaction, SaathiTxKind, Vouch, VouchLevel, VouchStatus,
};
use crate::error::EngineError;
use crate::reliability::{retry_with_backoff, BackgroundTaskManager, RetryPolicy, BLOCKCHAIN_BREAKER};
use crate::services::{BlockchainClient, Store};

#[derive(Debug, Clone, Serialize)]
pub struct SlashOutcome {
    pub slashed_amount: f64,
}

pub struct VouchingService {
    store: Arc<dyn Store>,
    blockchain: Arc<dyn BlockchainClient>,
    tasks: Arc<BackgroundTaskManager>,
}

impl VouchingService {
    pub fn new(
        store: Arc<dyn Store>,
        blockchain: Arc<dyn BlockchainClient>,
        tasks: Arc<BackgroundTaskManager>,
    ) -> Self {
        Self {
            store,
            blockchain,
            tasks,
        }
    }

    pub async fn create_vouch(
        &self,
        voucher_id: Uuid,
        vouchee_id: Uuid,
        circle_id: Uuid,
        level: VouchLevel,
        saathi_amount: f64,
    ) -> Result<Vouch, EngineError> {
        if saathi_amount < level.min_stake() {
            return Err(EngineError::Validation(format!(
                "Minimum stake for {} is {} SAATHI",
                level.as_str(),
                level.min_stake()
            )));
        }
        if saathi_amount > level.max_stake() {
            return Err(EngineError::Validation(format!(
                "Maximum stake for {} is {} SAATHI",
                level.as_str(),
                level.max_stake()
            )));
        }

        let profile = self.store.get_profile(voucher_id).await?;
        if profile.saathi_balance < saathi_amount {
            return Err(EngineError::Validation(format!(
                "Insufficient SAATHI. Need {saathi_amount}, have {}",
                profile.saathi_balance
            )));
        }

        let existing = self.store.get_vouches_given(voucher_id).await?;
        if existing
            .iter()
            .any(|v| v.vouchee_id == vouchee_id && v.status == VouchStatus::Active)
        {
            return Err(EngineError::Validation(
                "Already have an active vouch for this user".into(),
            ));
        }

        // Debit first; everything after this point must compensate on failure.
        self.store
            .update_saathi_balance(voucher_id, -saathi_amount)
            .await?;

        match self
            .record_vouch(voucher_id, vouchee_id, circle_id, level, saathi_amount)
            .await
        {
            Ok(vouch) => {
                self.notarize(vouch.clone(), voucher_id, vouchee_id, saathi_amount);
                info!(
                    %voucher_id, %vouchee_id, level = level.as_str(), stake = saathi_amount,
                    "vouch created"
                );
                Ok(vouch)
            }
            Err(err) => {
                error!("vouch creation failed after debit, compensating: {err}");
                if let Err(credit_err) = self
                    .store
                    .update_saathi_balance(voucher_id, saathi_amount)
                    .await
                {
                    error!("reconciliation credit failed: {credit_err}");
                }
                let reconciliation = SaathiTransaction {
                    id: Uuid::new_v4(),
                    user_id: voucher_id,
                    kind: SaathiTxKind::Unstake,
                    amount: saathi_amount,
                    reference_id: None,
                    description: "Reconciliation: vouch creation rolled back".into(),
                    created_at: Utc::now(),
                };
                if let Err(log_err) = self.store.create_saathi_transaction(reconciliation).await {
                    error!("reconciliation record failed: {log_err}");
                }
                Err(err)
            }
        }
    }

    async fn record_vouch(
        &self,
        voucher_id: Uuid,
        vouchee_id: Uuid,
        circle_id: Uuid,
        level: VouchLevel,
        saathi_amount: f64,
    ) -> Result<Vouch, EngineError> {
        let vouch = self
            .store
            .create_vouch(Vouch {
                id: Uuid::new_v4(),
                voucher_id,
                vouchee_id,
                circle_id,
                vouch_level: level,
                saathi_staked: saathi_amount,
                status: VouchStatus::Active,
                blockchain_tx_hash: None,
                created_at: Utc::now(),
            })
            .await?;

        self.store
            .update_trust_score(
                vouchee_id,
                level.trust_impact(),
                &format!("Received {} vouch", level.as_str()),
                None,
            )
            .await?;

        self.store
            .create_saathi_transaction(SaathiTransaction {
                id: Uuid::new_v4(),
                user_id: voucher_id,
                kind: SaathiTxKind::Stake,
                amount: saathi_amount,
                reference_id: Some(vouch.id.to_string()),
                description: format!("Staked for {} vouch", level.as_str()),
                created_at: Utc::now(),
            })
            .await?;

        Ok(vouch)
    }

    /// Chain notarization never blocks the caller; the tx hash is written
    /// back to the vouch row when it arrives.
    fn notarize(&self, vouch: Vouch, voucher_id: Uuid, vouchee_id: Uuid, amount: f64) {
        let store = self.store.clone();
        let blockchain = self.blockchain.clone();
        self.tasks.spawn("vouch.notarize", async move {
            let voucher = store.get_profile(voucher_id).await?;
            let vouchee = store.get_profile(vouchee_id).await?;
            let (Some(voucher_wallet), Some(vouchee_wallet)) =
                (voucher.wallet_address, vouchee.wallet_address)
            else {
                return Ok(());
            };

            let tx_hash = BLOCKCHAIN_BREAKER
                .call(|| async {
                    retry_with_backoff("blockchain.stake_for_vouch", &RetryPolicy::default(), || async {
                        blockchain
                            .stake_for_vouch(&voucher_wallet, &vouchee_wallet, amount as u64)
                            .await
                    })
                    .await
                })
                .await?;

            if let Some(hash) = tx_hash {
                store
                    .update_vouch_status(vouch.id, VouchStatus::Active, Some(hash))
                    .await?;
            }
            Ok(())
        });
    }

    /// Burn part of a stake when the vouchee defaults. The voucher loses 15
    /// trust points per slashed vouch per defaulted loan.
    pub async fn slash_vouch(
        &self,
        vouch_id: Uuid,
        default_loan_id: Uuid,
        slash_percentage: u32,
    ) -> Result<SlashOutcome, EngineError> {
        let vouch = self.store.get_vouch(vouch_id).await?;
        if vouch.status != VouchStatus::Active {
            return Err(EngineError::Validation("Vouch is not active".into()));
        }

        let slash_amount = vouch.saathi_staked * f64::from(slash_percentage) / 100.0;
        self.store
            .update_vouch_status(vouch_id, VouchStatus::Slashed, None)
            .await?;
        self.store
            .create_saathi_transaction(SaathiTransaction {
                id: Uuid::new_v4(),
                user_id: vouch.voucher_id,
                kind: SaathiTxKind::Slash,
                amount: slash_amount,
                reference_id: Some(default_loan_id.to_string()),
                description: format!("Slashed {slash_percentage}% for default"),
                created_at: Utc::now(),
            })
            .await?;
        self.store
            .update_trust_score(vouch.voucher_id, -15, "Vouched for defaulter", None)
            .await?;

        warn!(
            %vouch_id, amount = slash_amount, %default_loan_id,
            "vouch slashed for default"
        );
        Ok(SlashOutcome {
            slashed_amount: slash_amount,
        })
    }

    /// Return the stakes backing a borrower once their loan completes.
    pub async fn release_vouches_for(&self, vouchee_id: Uuid) -> Result<u32, EngineError> {
        let vouches = self.store.get_vouches_received(vouchee_id).await?;
        let mut released = 0;
        for vouch in vouches
            .into_iter()
            .filter(|v| v.status == VouchStatus::Active)
        {
            self.store
                .update_vouch_status(vouch.id, VouchStatus::Returned, None)
                .await?;
            self.store
                .update_saathi_balance(vouch.voucher_id, vouch.saathi_staked)
                .await?;
            self.store
                .create_saathi_transaction(SaathiTransaction {
                    id: Uuid::new_v4(),
                    user_id: vouch.voucher_id,
                    kind: SaathiTxKind::Unstake,
                    amount: vouch.saathi_staked,
                    reference_id: Some(vouch.id.to_string()),
                    description: "Stake returned after successful repayment".into(),
                    created_at: Utc::now(),
                })
                .await?;
            released += 1;
        }
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Language, Profile, ProfileMetadata};
    use crate::services::{MemoryStore, SimulatedLedger};

    async fn seed(store: &MemoryStore, balance: f64) -> Uuid {
        let id = Uuid::new_v4();
        store
            .create_profile(Profile {
                id,
                phone: format!("+91{}", &id.simple().to_string()[..10]),
                full_name: "Ravi".into(),
                language: Language::En,
                wallet_address: Some(format!("0x{}", id.simple())),
                trust_score: 40,
                saathi_balance: balance,
                is_verified: true,
                created_at: Utc::now(),
                metadata: ProfileMetadata::default(),
            })
            .await
            .unwrap();
        id
    }

    fn service(store: Arc<MemoryStore>) -> VouchingService {
        VouchingService::new(
            store,
            Arc::new(SimulatedLedger::new()),
            Arc::new(BackgroundTaskManager::new()),
        )
    }

    #[tokio::test]
    async fn test_create_vouch_applies_all_side_effects() {
        let store = Arc::new(MemoryStore::new());
        let voucher = seed(&store, 100.0).await;
        let vouchee = seed(&store, 0.0).await;
        let svc = service(store.clone());

        let vouch = svc
            .create_vouch(voucher, vouchee, Uuid::new_v4(), VouchLevel::Strong, 60.0)
            .await
            .unwrap();
        assert_eq!(vouch.status, VouchStatus::Active);

        let voucher_profile = store.get_profile(voucher).await.unwrap();
        assert_eq!(voucher_profile.saathi_balance, 40.0);
        let vouchee_profile = store.get_profile(vouchee).await.unwrap();
        assert_eq!(vouchee_profile.trust_score, 50);

        let txs = store.transactions_snapshot();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].kind, SaathiTxKind::Stake);
    }

    #[tokio::test]
    async fn test_stake_bounds_validated() {
        let store = Arc::new(MemoryStore::new());
        let voucher = seed(&store, 1000.0).await;
        let vouchee = seed(&store, 0.0).await;
        let svc = service(store);

        let too_low = svc
            .create_vouch(voucher, vouchee, Uuid::new_v4(), VouchLevel::Maximum, 100.0)
            .await;
        assert!(matches!(too_low, Err(EngineError::Validation(_))));

        let too_high = svc
            .create_vouch(voucher, vouchee, Uuid::new_v4(), VouchLevel::Basic, 80.0)
            .await;
        assert!(matches!(too_high, Err(EngineError::Validation(_))));
    }

    #[tokio::test]
    async fn test_insufficient_balance_rejected_before_debit() {
        let store = Arc::new(MemoryStore::new());
        let voucher = seed(&store, 5.0).await;
        let vouchee = seed(&store, 0.0).await;
        let svc = service(store.clone());

        let result = svc
            .create_vouch(voucher, vouchee, Uuid::new_v4(), VouchLevel::Basic, 20.0)
            .await;
        assert!(matches!(result, Err(EngineError::Validation(_))));
        assert_eq!(store.get_profile(voucher).await.unwrap().saathi_balance, 5.0);
    }

    #[tokio::test]
    async fn test_duplicate_active_vouch_rejected() {
        let store = Arc::new(MemoryStore::new());
        let voucher = seed(&store, 500.0).await;
        let vouchee = seed(&store, 0.0).await;
        let svc = service(store);

        svc.create_vouch(voucher, vouchee, Uuid::new_v4(), VouchLevel::Basic, 20.0)
            .await
            .unwrap();
        let again = svc
            .create_vouch(voucher, vouchee, Uuid::new_v4(), VouchLevel::Basic, 20.0)
            .await;
        assert!(matches!(again, Err(EngineError::Validation(_))));
    }

    #[tokio::test]
    async fn test_compensation_when_vouchee_vanishes() {
        let store = Arc::new(MemoryStore::new());
        let voucher = seed(&store, 100.0).await;
        // Vouchee never created: the trust-score write fails after the debit.
        let vouchee = Uuid::new_v4();
        let svc = service(store.clone());

        let result = svc
            .create_vouch(voucher, vouchee, Uuid::new_v4(), VouchLevel::Basic, 30.0)
            .await;
        assert!(result.is_err());

        // Debit was compensated and the reconciliation is on record.
        let profile = store.get_profile(voucher).await.unwrap();
        assert_eq!(profile.saathi_balance, 100.0);
        let txs = store.transactions_snapshot();
        assert!(txs
            .iter()
            .any(|t| t.kind == SaathiTxKind::Unstake && t.description.contains("Reconciliation")));
    }

    #[tokio::test]
    async fn test_slash_burns_stake_and_trust() {
        let store = Arc::new(MemoryStore::new());
        let voucher = seed(&store, 500.0).await;
        let vouchee = seed(&store, 0.0).await;
        let svc = service(store.clone());

        let vouch = svc
            .create_vouch(voucher, vouchee, Uuid::new_v4(), VouchLevel::Maximum, 400.0)
            .await
            .unwrap();
        let outcome = svc
            .slash_vouch(vouch.id, Uuid::new_v4(), 50)
            .await
            .unwrap();
        assert_eq!(outcome.slashed_amount, 200.0);

        let slashed = store.get_vouch(vouch.id).await.unwrap();
        assert_eq!(slashed.status, VouchStatus::Slashed);
        // 40 - 15 = 25.
        assert_eq!(store.get_profile(voucher).await.unwrap().trust_score, 25);

        // A slashed vouch cannot be slashed twice.
        assert!(svc.slash_vouch(vouch.id, Uuid::new_v4(), 50).await.is_err());
    }

    #[tokio::test]
    async fn test_release_returns_stakes() {
        let store = Arc::new(MemoryStore::new());
        let voucher = seed(&store, 100.0).await;
        let vouchee = seed(&store, 0.0).await;
        let svc = service(store.clone());

        svc.create_vouch(voucher, vouchee, Uuid::new_v4(), VouchLevel::Basic, 40.0)
            .await
            .unwrap();
        assert_eq!(store.get_profile(voucher).await.unwrap().saathi_balance, 60.0);

        let released = svc.release_vouches_for(vouchee).await.unwrap();
        assert_eq!(released, 1);
        assert_eq!(store.get_profile(voucher).await.unwrap().saathi_balance, 100.0);
    }
}
