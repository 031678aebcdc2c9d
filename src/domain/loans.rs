//! Loan Domain Service
//!
//! Loan lifecycle on top of the AI pipeline: request with risk assessment,
//! quadratic member voting, disbursement through the payment gateway, and
//! idempotent repayment processing keyed by the gateway payment id.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::governance::{QuadraticVoting, TallyResult, VoteBallot, VoteChoice};
use crate::domain::vouching::VouchingService;
use crate::domain::{
    Loan, LoanStatus, LoanUpdate, LoanVote, Repayment, RepaymentStatus,
};
use crate::error::EngineError;
use crate::orchestrator::{LoanDecision, Orchestrator};
use crate::reliability::{BackgroundTaskManager, RequestId, MESSAGING_BREAKER, PAYMENTS_BREAKER};
use crate::services::{
    BlockchainClient, Channel, MessagingClient, PaymentsClient, Store, TemplateKey,
};

/// Principal plus 10% flat interest marks a loan fully repaid.
const REPAYMENT_TARGET_FACTOR: f64 = 1.1;

#[derive(Debug, Clone, Serialize)]
pub struct LoanRequestOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loan: Option<Loan>,
    pub ai_analysis: LoanDecision,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepaymentOutcome {
    pub repayment: Repayment,
    pub total_repaid: f64,
    pub loan_status: LoanStatus,
    /// True when this payment id was already processed; nothing was re-applied.
    pub duplicate: bool,
}

pub struct LoanService {
    store: Arc<dyn Store>,
    orchestrator: Arc<Orchestrator>,
    payments: Arc<dyn PaymentsClient>,
    messaging: Arc<dyn MessagingClient>,
    blockchain: Arc<dyn BlockchainClient>,
    tasks: Arc<BackgroundTaskManager>,
    voting: QuadraticVoting,
}

impl LoanService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        orchestrator: Arc<Orchestrator>,
        payments: Arc<dyn PaymentsClient>,
        messaging: Arc<dyn MessagingClient>,
        blockchain: Arc<dyn BlockchainClient>,
        tasks: Arc<BackgroundTaskManager>,
    ) -> Self {
        Self {
            store,
            orchestrator,
            payments,
            messaging,
            blockchain,
            tasks,
            voting: QuadraticVoting::default(),
        }
    }

    /// Run the AI pipeline and, when approved, open the loan for voting.
    pub async fn request_loan(
        &self,
        borrower_id: Uuid,
        circle_id: Uuid,
        amount: f64,
        purpose: &str,
        tenure_days: u32,
        request_id: RequestId,
    ) -> Result<LoanRequestOutcome, EngineError> {
        if amount <= 0.0 {
            return Err(EngineError::Validation("Loan amount must be positive".into()));
        }
        if tenure_days < 7 {
            return Err(EngineError::Validation(
                "Tenure must be at least one week".into(),
            ));
        }

        let decision = self
            .orchestrator
            .process_loan_request(borrower_id, amount, purpose, circle_id, request_id)
            .await;

        if !decision.approved {
            return Ok(LoanRequestOutcome {
                success: false,
                loan: None,
                ai_analysis: decision,
            });
        }

        let approved_amount = decision.approved_amount;
        let weekly_emi = approved_amount / f64::from(tenure_days / 7);
        let loan = self
            .store
            .create_loan(Loan {
                id: Uuid::new_v4(),
                borrower_id,
                circle_id,
                amount: approved_amount,
                purpose: purpose.to_string(),
                tenure_days,
                emi_amount: weekly_emi,
                status: LoanStatus::Voting,
                risk_category: decision.risk_category.clone(),
                blockchain_tx_hash: None,
                created_at: Utc::now(),
                disbursed_at: None,
                completed_at: None,
            })
            .await?;

        self.notarize_loan(loan.clone());
        info!(loan_id = %loan.id, %borrower_id, amount = approved_amount, "loan opened for voting");

        Ok(LoanRequestOutcome {
            success: true,
            loan: Some(loan),
            ai_analysis: decision,
        })
    }

    fn notarize_loan(&self, loan: Loan) {
        let store = self.store.clone();
        let blockchain = self.blockchain.clone();
        self.tasks.spawn("loan.notarize", async move {
            let borrower = store.get_profile(loan.borrower_id).await?;
            let Some(wallet) = borrower.wallet_address else {
                return Ok(());
            };
            let tx_hash = blockchain
                .record_loan(loan.id, &wallet, loan.amount as u64, loan.tenure_days)
                .await?;
            if let Some(hash) = tx_hash {
                store
                    .update_loan(
                        loan.id,
                        LoanUpdate {
                            blockchain_tx_hash: Some(hash),
                            ..LoanUpdate::default()
                        },
                    )
                    .await?;
            }
            Ok(())
        });
    }

    /// Record a quadratic vote and tally. Approval flips the loan status and
    /// notifies the borrower.
    pub async fn vote_on_loan(
        &self,
        loan_id: Uuid,
        voter_id: Uuid,
        support: bool,
        tokens_spent: u32,
    ) -> Result<TallyResult, EngineError> {
        let loan = self.store.get_loan(loan_id).await?;
        if loan.status != LoanStatus::Voting {
            return Err(EngineError::Validation("Voting is closed".into()));
        }
        let members = self.store.get_circle_members(loan.circle_id).await?;
        if !members.iter().any(|m| m.user_id == voter_id) {
            return Err(EngineError::Validation("Not a circle member".into()));
        }
        if loan.borrower_id == voter_id {
            return Err(EngineError::Validation("Cannot vote on own loan".into()));
        }

        self.store
            .create_loan_vote(LoanVote {
                loan_id,
                voter_id,
                support,
                tokens_spent,
                vote_weight: QuadraticVoting::vote_power(tokens_spent),
                created_at: Utc::now(),
            })
            .await?;

        let ballots: Vec<VoteBallot> = self
            .store
            .get_loan_votes(loan_id)
            .await?
            .into_iter()
            .map(|v| VoteBallot {
                voter_id: v.voter_id,
                tokens_spent: v.tokens_spent,
                choice: if v.support {
                    VoteChoice::For
                } else {
                    VoteChoice::Against
                },
            })
            .collect();
        let tally = self.voting.tally(&ballots);
        info!(%loan_id, approval = tally.approval_percentage, voters = tally.total_voters, "vote tallied");

        if tally.approved {
            self.store
                .update_loan(
                    loan_id,
                    LoanUpdate {
                        status: Some(LoanStatus::Approved),
                        ..LoanUpdate::default()
                    },
                )
                .await?;
            self.notify_approval(&loan).await;
        }
        Ok(tally)
    }

    async fn notify_approval(&self, loan: &Loan) {
        let Ok(borrower) = self.store.get_profile(loan.borrower_id).await else {
            return;
        };
        let send = MESSAGING_BREAKER
            .call(|| async {
                self.messaging
                    .send_templated(
                        Channel::Whatsapp,
                        &borrower.phone,
                        TemplateKey::LoanApproved,
                        &[format!("{:.0}", loan.amount)],
                        borrower.language,
                    )
                    .await
            })
            .await;
        if let Err(err) = send {
            warn!("approval notification failed: {err}");
        }
    }

    /// Pay out an approved loan to the borrower's UPI handle.
    pub async fn disburse_loan(&self, loan_id: Uuid) -> Result<Loan, EngineError> {
        let loan = self.store.get_loan(loan_id).await?;
        if loan.status != LoanStatus::Approved {
            return Err(EngineError::Validation(format!(
                "Loan cannot be disbursed, status: {}",
                serde_json::to_string(&loan.status).unwrap_or_default()
            )));
        }
        let borrower = self.store.get_profile(loan.borrower_id).await?;
        let upi_id = format!("{}@upi", borrower.phone.trim_start_matches('+'));

        let payout = PAYMENTS_BREAKER
            .call(|| async {
                self.payments
                    .create_payout(
                        loan.amount,
                        &upi_id,
                        &borrower.full_name,
                        json!({ "loan_id": loan.id }),
                    )
                    .await
            })
            .await?;
        info!(%loan_id, payout_id = %payout.payout_id, "loan disbursed");

        let loan = self
            .store
            .update_loan(
                loan_id,
                LoanUpdate {
                    status: Some(LoanStatus::Disbursed),
                    disbursed_at: Some(Utc::now()),
                    ..LoanUpdate::default()
                },
            )
            .await?;
        Ok(loan)
    }
}

pub struct RepaymentService {
    store: Arc<dyn Store>,
    blockchain: Arc<dyn BlockchainClient>,
    vouching: Arc<VouchingService>,
    tasks: Arc<BackgroundTaskManager>,
}

impl RepaymentService {
    pub fn new(
        store: Arc<dyn Store>,
        blockchain: Arc<dyn BlockchainClient>,
        vouching: Arc<VouchingService>,
        tasks: Arc<BackgroundTaskManager>,
    ) -> Self {
        Self {
            store,
            blockchain,
            vouching,
            tasks,
        }
    }

    /// Apply a completed gateway payment to a loan. The payment id is the
    /// dedupe key: a replayed webhook returns the original outcome and
    /// changes nothing.
    pub async fn process_repayment(
        &self,
        loan_id: Uuid,
        amount: f64,
        payment_id: &str,
    ) -> Result<RepaymentOutcome, EngineError> {
        if let Some(existing) = self.store.get_repayment_by_payment_id(payment_id).await? {
            let loan = self.store.get_loan(existing.loan_id).await?;
            let total_repaid = self.total_repaid(existing.loan_id).await?;
            info!(%payment_id, "duplicate webhook, repayment already applied");
            return Ok(RepaymentOutcome {
                repayment: existing,
                total_repaid,
                loan_status: loan.status,
                duplicate: true,
            });
        }

        let loan = self.store.get_loan(loan_id).await?;
        let repayment = self
            .store
            .create_repayment(Repayment {
                id: Uuid::new_v4(),
                loan_id,
                amount,
                payment_id: payment_id.to_string(),
                status: RepaymentStatus::Completed,
                blockchain_tx_hash: None,
                created_at: Utc::now(),
            })
            .await?;

        let blockchain = self.blockchain.clone();
        self.tasks.spawn("repayment.notarize", async move {
            blockchain.record_repayment(loan_id, amount as u64).await?;
            Ok(())
        });

        self.store
            .update_trust_score(loan.borrower_id, 5, "On-time repayment", None)
            .await?;

        let total_repaid = self.total_repaid(loan_id).await?;
        let mut loan_status = loan.status;
        if total_repaid >= loan.amount * REPAYMENT_TARGET_FACTOR {
            self.store
                .update_loan(
                    loan_id,
                    LoanUpdate {
                        status: Some(LoanStatus::Completed),
                        completed_at: Some(Utc::now()),
                        ..LoanUpdate::default()
                    },
                )
                .await?;
            loan_status = LoanStatus::Completed;
            let released = self.vouching.release_vouches_for(loan.borrower_id).await?;
            info!(%loan_id, released, "loan completed, stakes returned");
        }

        Ok(RepaymentOutcome {
            repayment,
            total_repaid,
            loan_status,
            duplicate: false,
        })
    }

    /// Keep the audit trail for failed gateway payments.
    pub async fn record_failed_payment(
        &self,
        loan_id: Uuid,
        amount: f64,
        payment_id: &str,
    ) -> Result<(), EngineError> {
        self.store
            .create_repayment(Repayment {
                id: Uuid::new_v4(),
                loan_id,
                amount,
                payment_id: payment_id.to_string(),
                status: RepaymentStatus::Failed,
                blockchain_tx_hash: None,
                created_at: Utc::now(),
            })
            .await?;
        warn!(%loan_id, %payment_id, "payment failed");
        Ok(())
    }

    async fn total_repaid(&self, loan_id: Uuid) -> Result<f64, EngineError> {
        Ok(self
            .store
            .get_loan_repayments(loan_id)
            .await?
            .iter()
            .filter(|r| r.status == RepaymentStatus::Completed)
            .map(|r| r.amount)
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CircleMember, Language, Profile, ProfileMetadata};
    use crate::services::{MemoryStore, SimulatedLedger};

    async fn seed_profile(store: &MemoryStore, trust: i64) -> Uuid {
        let id = Uuid::new_v4();
        store
            .create_profile(Profile {
                id,
                phone: format!("+91{}", &id.simple().to_string()[..10]),
                full_name: "Devi".into(),
                language: Language::En,
                wallet_address: None,
                trust_score: trust,
                saathi_balance: 0.0,
                is_verified: true,
                created_at: Utc::now(),
                metadata: ProfileMetadata::default(),
            })
            .await
            .unwrap();
        id
    }

    async fn seed_loan(store: &MemoryStore, borrower_id: Uuid, status: LoanStatus) -> Loan {
        store
            .create_loan(Loan {
                id: Uuid::new_v4(),
                borrower_id,
                circle_id: Uuid::new_v4(),
                amount: 5000.0,
                purpose: "shop".into(),
                tenure_days: 70,
                emi_amount: 500.0,
                status,
                risk_category: None,
                blockchain_tx_hash: None,
                created_at: Utc::now(),
                disbursed_at: None,
                completed_at: None,
            })
            .await
            .unwrap()
    }

    fn test_orchestrator(store: Arc<MemoryStore>) -> Arc<Orchestrator> {
        use crate::services::*;
        struct SilentSpeech;
        #[async_trait::async_trait]
        impl SpeechBackend for SilentSpeech {
            async fn render(
                &self,
                _text: &str,
                _voice: &str,
                _model: &str,
            ) -> Result<Vec<u8>, EngineError> {
                Ok(Vec::new())
            }
        }
        let services = Services {
            store,
            llm: Arc::new(ScriptedLlm::new()),
            payments: Arc::new(SimulatedPayments),
            messaging: Arc::new(NullMessaging),
            blockchain: Arc::new(SimulatedLedger::new()),
            tts: Arc::new(TtsEngine::new(
                Box::new(SilentSpeech),
                VoiceMap {
                    en: "a".into(),
                    hi: "b".into(),
                    ml: "c".into(),
                },
                "m",
            )),
            tasks: Arc::new(BackgroundTaskManager::new()),
        };
        Arc::new(Orchestrator::new(
            services,
            &crate::config::Config::from_env().unwrap(),
        ))
    }

    fn loan_service(store: Arc<MemoryStore>) -> LoanService {
        LoanService::new(
            store.clone(),
            test_orchestrator(store),
            Arc::new(crate::services::SimulatedPayments),
            Arc::new(crate::services::NullMessaging),
            Arc::new(SimulatedLedger::new()),
            Arc::new(BackgroundTaskManager::new()),
        )
    }

    fn repayments(store: Arc<MemoryStore>) -> RepaymentService {
        let tasks = Arc::new(BackgroundTaskManager::new());
        let ledger: Arc<dyn BlockchainClient> = Arc::new(SimulatedLedger::new());
        let vouching = Arc::new(VouchingService::new(
            store.clone(),
            ledger.clone(),
            tasks.clone(),
        ));
        RepaymentService::new(store, ledger, vouching, tasks)
    }

    #[tokio::test]
    async fn test_repayment_is_idempotent_on_payment_id() {
        let store = Arc::new(MemoryStore::new());
        let borrower = seed_profile(&store, 40).await;
        let loan = seed_loan(&store, borrower, LoanStatus::Repaying).await;
        let svc = repayments(store.clone());

        let first = svc
            .process_repayment(loan.id, 550.0, "p-42")
            .await
            .unwrap();
        assert!(!first.duplicate);
        let second = svc
            .process_repayment(loan.id, 550.0, "p-42")
            .await
            .unwrap();
        assert!(second.duplicate);
        assert_eq!(second.total_repaid, 550.0);

        // Trust bump applied exactly once: 40 + 5.
        assert_eq!(store.get_profile(borrower).await.unwrap().trust_score, 45);
        assert_eq!(store.get_loan_repayments(loan.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_full_repayment_completes_loan() {
        let store = Arc::new(MemoryStore::new());
        let borrower = seed_profile(&store, 40).await;
        let loan = seed_loan(&store, borrower, LoanStatus::Repaying).await;
        let svc = repayments(store.clone());

        // 5000 * 1.1 = 5500 target.
        svc.process_repayment(loan.id, 3000.0, "p-1").await.unwrap();
        let mid = store.get_loan(loan.id).await.unwrap();
        assert_eq!(mid.status, LoanStatus::Repaying);

        let outcome = svc.process_repayment(loan.id, 2500.0, "p-2").await.unwrap();
        assert_eq!(outcome.loan_status, LoanStatus::Completed);
        assert!(store.get_loan(loan.id).await.unwrap().completed_at.is_some());
    }

    #[tokio::test]
    async fn test_failed_payment_recorded_without_trust_change() {
        let store = Arc::new(MemoryStore::new());
        let borrower = seed_profile(&store, 40).await;
        let loan = seed_loan(&store, borrower, LoanStatus::Repaying).await;
        let svc = repayments(store.clone());

        svc.record_failed_payment(loan.id, 550.0, "p-bad")
            .await
            .unwrap();
        assert_eq!(store.get_profile(borrower).await.unwrap().trust_score, 40);
        let rows = store.get_loan_repayments(loan.id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, RepaymentStatus::Failed);
    }

    #[tokio::test]
    async fn test_vote_guards() {
        let store = Arc::new(MemoryStore::new());
        let borrower = seed_profile(&store, 40).await;
        let voter = seed_profile(&store, 40).await;
        let loan = seed_loan(&store, borrower, LoanStatus::Voting).await;

        let svc = loan_service(store.clone());

        // Not a circle member.
        let err = svc.vote_on_loan(loan.id, voter, true, 9).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        store
            .add_circle_member(CircleMember {
                circle_id: loan.circle_id,
                user_id: voter,
                role: "member".into(),
            })
            .await
            .unwrap();
        store
            .add_circle_member(CircleMember {
                circle_id: loan.circle_id,
                user_id: borrower,
                role: "member".into(),
            })
            .await
            .unwrap();

        // Borrower cannot vote on their own loan.
        let err = svc
            .vote_on_loan(loan.id, borrower, true, 9)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        // First vote lands, duplicate conflicts.
        let tally = svc.vote_on_loan(loan.id, voter, true, 9).await.unwrap();
        assert_eq!(tally.total_voters, 1);
        assert!(!tally.approved);
        let err = svc.vote_on_loan(loan.id, voter, true, 9).await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_disburse_requires_approved_status() {
        let store = Arc::new(MemoryStore::new());
        let borrower = seed_profile(&store, 40).await;
        let loan = seed_loan(&store, borrower, LoanStatus::Voting).await;

        let svc = loan_service(store.clone());

        let err = svc.disburse_loan(loan.id).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        store
            .update_loan(
                loan.id,
                LoanUpdate {
                    status: Some(LoanStatus::Approved),
                    ..LoanUpdate::default()
                },
            )
            .await
            .unwrap();
        let disbursed = svc.disburse_loan(loan.id).await.unwrap();
        assert_eq!(disbursed.status, LoanStatus::Disbursed);
        assert!(disbursed.disbursed_at.is_some());
    }
}
