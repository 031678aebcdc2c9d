//! Store Port
//!
//! Key-value-like persistence surface for profiles, loans, vouches, circles,
//! diary entries and transactions. The core only sees this trait; the
//! in-memory implementation backs tests and local development.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::*;
use crate::error::EngineError;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Terminal: the entity does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),
    /// Terminal: a uniqueness rule was violated.
    #[error("{0}")]
    Conflict(String),
    /// Retriable: the backing store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(entity) => EngineError::NotFound(entity),
            StoreError::Conflict(msg) => EngineError::Conflict(msg),
            StoreError::Unavailable(reason) => EngineError::DependencyFailure {
                name: "store",
                reason,
            },
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    // Profiles
    async fn get_profile(&self, user_id: Uuid) -> Result<Profile, StoreError>;
    async fn get_profile_by_phone(&self, phone: &str) -> Result<Profile, StoreError>;
    async fn create_profile(&self, profile: Profile) -> Result<Profile, StoreError>;
    async fn update_profile(&self, profile: Profile) -> Result<(), StoreError>;
    /// Apply a delta, clamp to [0, 100], record a trust-score event.
    /// Returns the new score.
    async fn update_trust_score(
        &self,
        user_id: Uuid,
        delta: i64,
        reason: &str,
        tx_hash: Option<String>,
    ) -> Result<i64, StoreError>;
    /// Apply a signed delta to the SAATHI balance; returns the new balance.
    async fn update_saathi_balance(&self, user_id: Uuid, delta: f64) -> Result<f64, StoreError>;
    async fn create_saathi_transaction(&self, tx: SaathiTransaction) -> Result<(), StoreError>;

    // Loans
    async fn get_loan(&self, loan_id: Uuid) -> Result<Loan, StoreError>;
    async fn get_user_loans(&self, user_id: Uuid) -> Result<Vec<Loan>, StoreError>;
    async fn create_loan(&self, loan: Loan) -> Result<Loan, StoreError>;
    async fn update_loan(&self, loan_id: Uuid, update: LoanUpdate) -> Result<Loan, StoreError>;
    async fn get_loan_votes(&self, loan_id: Uuid) -> Result<Vec<LoanVote>, StoreError>;
    /// Fails with Conflict when the voter already voted on this loan.
    async fn create_loan_vote(&self, vote: LoanVote) -> Result<(), StoreError>;

    // Repayments
    async fn create_repayment(&self, repayment: Repayment) -> Result<Repayment, StoreError>;
    async fn get_loan_repayments(&self, loan_id: Uuid) -> Result<Vec<Repayment>, StoreError>;
    async fn get_repayment_by_payment_id(
        &self,
        payment_id: &str,
    ) -> Result<Option<Repayment>, StoreError>;

    // Vouches
    async fn get_vouch(&self, vouch_id: Uuid) -> Result<Vouch, StoreError>;
    async fn get_vouches_given(&self, user_id: Uuid) -> Result<Vec<Vouch>, StoreError>;
    async fn get_vouches_received(&self, user_id: Uuid) -> Result<Vec<Vouch>, StoreError>;
    async fn create_vouch(&self, vouch: Vouch) -> Result<Vouch, StoreError>;
    async fn update_vouch_status(
        &self,
        vouch_id: Uuid,
        status: VouchStatus,
        tx_hash: Option<String>,
    ) -> Result<Vouch, StoreError>;

    // Circles
    async fn create_circle(&self, circle: Circle) -> Result<Circle, StoreError>;
    async fn get_user_circles(&self, user_id: Uuid) -> Result<Vec<Circle>, StoreError>;
    async fn get_all_circles(&self) -> Result<Vec<Circle>, StoreError>;
    async fn get_circle_members(&self, circle_id: Uuid) -> Result<Vec<CircleMember>, StoreError>;
    async fn add_circle_member(&self, member: CircleMember) -> Result<(), StoreError>;
    async fn get_circle_stats(&self, circle_id: Uuid) -> Result<CircleStats, StoreError>;

    // Diary
    async fn create_diary_entry(&self, entry: DiaryEntry) -> Result<(), StoreError>;
    async fn get_diary_entries(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<DiaryEntry>, StoreError>;

    // Aggregates
    async fn get_user_stats(&self, user_id: Uuid) -> Result<UserStats, StoreError>;
}

#[derive(Default)]
struct StoreInner {
    profiles: HashMap<Uuid, Profile>,
    loans: HashMap<Uuid, Loan>,
    loan_votes: HashMap<Uuid, Vec<LoanVote>>,
    repayments: Vec<Repayment>,
    vouches: HashMap<Uuid, Vouch>,
    circles: HashMap<Uuid, Circle>,
    members: Vec<CircleMember>,
    diary: Vec<DiaryEntry>,
    transactions: Vec<SaathiTransaction>,
    trust_history: Vec<TrustScoreEvent>,
    member_counter: u64,
}

/// In-memory store. Every record lives behind one process-wide lock; good
/// enough for tests and single-node development.
pub struct MemoryStore {
    inner: RwLock<StoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
        }
    }

    /// Stake/slash transactions recorded so far, newest last.
    pub fn transactions_snapshot(&self) -> Vec<SaathiTransaction> {
        self.inner.read().unwrap().transactions.clone()
    }

    pub fn trust_history_snapshot(&self) -> Vec<TrustScoreEvent> {
        self.inner.read().unwrap().trust_history.clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_profile(&self, user_id: Uuid) -> Result<Profile, StoreError> {
        self.inner
            .read()
            .unwrap()
            .profiles
            .get(&user_id)
            .cloned()
            .ok_or(StoreError::NotFound("profile"))
    }

    async fn get_profile_by_phone(&self, phone: &str) -> Result<Profile, StoreError> {
        self.inner
            .read()
            .unwrap()
            .profiles
            .values()
            .find(|p| p.phone == phone)
            .cloned()
            .ok_or(StoreError::NotFound("profile"))
    }

    async fn create_profile(&self, profile: Profile) -> Result<Profile, StoreError> {
        let mut inner = self.inner.write().unwrap();
        if inner.profiles.values().any(|p| p.phone == profile.phone) {
            return Err(StoreError::Conflict(format!(
                "profile with phone {} already exists",
                profile.phone
            )));
        }
        inner.member_counter += 1;
        inner.profiles.insert(profile.id, profile.clone());
        Ok(profile)
    }

    async fn update_profile(&self, profile: Profile) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        if !inner.profiles.contains_key(&profile.id) {
            return Err(StoreError::NotFound("profile"));
        }
        inner.profiles.insert(profile.id, profile);
        Ok(())
    }

    async fn update_trust_score(
        &self,
        user_id: Uuid,
        delta: i64,
        reason: &str,
        tx_hash: Option<String>,
    ) -> Result<i64, StoreError> {
        let mut inner = self.inner.write().unwrap();
        let profile = inner
            .profiles
            .get_mut(&user_id)
            .ok_or(StoreError::NotFound("profile"))?;
        profile.trust_score = (profile.trust_score + delta).clamp(0, 100);
        let score_after = profile.trust_score;
        inner.trust_history.push(TrustScoreEvent {
            id: Uuid::new_v4(),
            user_id,
            delta,
            score_after,
            reason: reason.to_string(),
            tx_hash,
            created_at: Utc::now(),
        });
        Ok(score_after)
    }

    async fn update_saathi_balance(&self, user_id: Uuid, delta: f64) -> Result<f64, StoreError> {
        let mut inner = self.inner.write().unwrap();
        let profile = inner
            .profiles
            .get_mut(&user_id)
            .ok_or(StoreError::NotFound("profile"))?;
        profile.saathi_balance += delta;
        Ok(profile.saathi_balance)
    }

    async fn create_saathi_transaction(&self, tx: SaathiTransaction) -> Result<(), StoreError> {
        self.inner.write().unwrap().transactions.push(tx);
        Ok(())
    }

    async fn get_loan(&self, loan_id: Uuid) -> Result<Loan, StoreError> {
        self.inner
            .read()
            .unwrap()
            .loans
            .get(&loan_id)
            .cloned()
            .ok_or(StoreError::NotFound("loan"))
    }

    async fn get_user_loans(&self, user_id: Uuid) -> Result<Vec<Loan>, StoreError> {
        let mut loans: Vec<Loan> = self
            .inner
            .read()
            .unwrap()
            .loans
            .values()
            .filter(|l| l.borrower_id == user_id)
            .cloned()
            .collect();
        loans.sort_by_key(|l| l.created_at);
        Ok(loans)
    }

    async fn create_loan(&self, loan: Loan) -> Result<Loan, StoreError> {
        self.inner.write().unwrap().loans.insert(loan.id, loan.clone());
        Ok(loan)
    }

    async fn update_loan(&self, loan_id: Uuid, update: LoanUpdate) -> Result<Loan, StoreError> {
        let mut inner = self.inner.write().unwrap();
        let loan = inner
            .loans
            .get_mut(&loan_id)
            .ok_or(StoreError::NotFound("loan"))?;
        if let Some(status) = update.status {
            loan.status = status;
        }
        if let Some(hash) = update.blockchain_tx_hash {
            loan.blockchain_tx_hash = Some(hash);
        }
        if let Some(at) = update.disbursed_at {
            loan.disbursed_at = Some(at);
        }
        if let Some(at) = update.completed_at {
            loan.completed_at = Some(at);
        }
        Ok(loan.clone())
    }

    async fn get_loan_votes(&self, loan_id: Uuid) -> Result<Vec<LoanVote>, StoreError> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .loan_votes
            .get(&loan_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_loan_vote(&self, vote: LoanVote) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        let votes = inner.loan_votes.entry(vote.loan_id).or_default();
        if votes.iter().any(|v| v.voter_id == vote.voter_id) {
            return Err(StoreError::Conflict("already voted on this loan".into()));
        }
        votes.push(vote);
        Ok(())
    }

    async fn create_repayment(&self, repayment: Repayment) -> Result<Repayment, StoreError> {
        self.inner.write().unwrap().repayments.push(repayment.clone());
        Ok(repayment)
    }

    async fn get_loan_repayments(&self, loan_id: Uuid) -> Result<Vec<Repayment>, StoreError> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .repayments
            .iter()
            .filter(|r| r.loan_id == loan_id)
            .cloned()
            .collect())
    }

    async fn get_repayment_by_payment_id(
        &self,
        payment_id: &str,
    ) -> Result<Option<Repayment>, StoreError> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .repayments
            .iter()
            .find(|r| r.payment_id == payment_id)
            .cloned())
    }

    async fn get_vouch(&self, vouch_id: Uuid) -> Result<Vouch, StoreError> {
        self.inner
            .read()
            .unwrap()
            .vouches
            .get(&vouch_id)
            .cloned()
            .ok_or(StoreError::NotFound("vouch"))
    }

    async fn get_vouches_given(&self, user_id: Uuid) -> Result<Vec<Vouch>, StoreError> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .vouches
            .values()
            .filter(|v| v.voucher_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_vouches_received(&self, user_id: Uuid) -> Result<Vec<Vouch>, StoreError> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .vouches
            .values()
            .filter(|v| v.vouchee_id == user_id)
            .cloned()
            .collect())
    }

    async fn create_vouch(&self, vouch: Vouch) -> Result<Vouch, StoreError> {
        self.inner.write().unwrap().vouches.insert(vouch.id, vouch.clone());
        Ok(vouch)
    }

    async fn update_vouch_status(
        &self,
        vouch_id: Uuid,
        status: VouchStatus,
        tx_hash: Option<String>,
    ) -> Result<Vouch, StoreError> {
        let mut inner = self.inner.write().unwrap();
        let vouch = inner
            .vouches
            .get_mut(&vouch_id)
            .ok_or(StoreError::NotFound("vouch"))?;
        vouch.status = status;
        if let Some(hash) = tx_hash {
            vouch.blockchain_tx_hash = Some(hash);
        }
        Ok(vouch.clone())
    }

    async fn create_circle(&self, circle: Circle) -> Result<Circle, StoreError> {
        self.inner.write().unwrap().circles.insert(circle.id, circle.clone());
        Ok(circle)
    }

    async fn get_user_circles(&self, user_id: Uuid) -> Result<Vec<Circle>, StoreError> {
        let inner = self.inner.read().unwrap();
        let mut circles: Vec<Circle> = inner
            .members
            .iter()
            .filter(|m| m.user_id == user_id)
            .filter_map(|m| inner.circles.get(&m.circle_id).cloned())
            .collect();
        circles.sort_by_key(|c| c.created_at);
        Ok(circles)
    }

    async fn get_all_circles(&self) -> Result<Vec<Circle>, StoreError> {
        let mut circles: Vec<Circle> =
            self.inner.read().unwrap().circles.values().cloned().collect();
        circles.sort_by_key(|c| c.created_at);
        Ok(circles)
    }

    async fn get_circle_members(&self, circle_id: Uuid) -> Result<Vec<CircleMember>, StoreError> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .members
            .iter()
            .filter(|m| m.circle_id == circle_id)
            .cloned()
            .collect())
    }

    async fn add_circle_member(&self, member: CircleMember) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        if let Some(circle) = inner.circles.get_mut(&member.circle_id) {
            circle.member_count += 1;
        }
        inner.members.push(member);
        Ok(())
    }

    async fn get_circle_stats(&self, circle_id: Uuid) -> Result<CircleStats, StoreError> {
        let inner = self.inner.read().unwrap();
        let circle_loans: Vec<&Loan> = inner
            .loans
            .values()
            .filter(|l| l.circle_id == circle_id)
            .collect();
        let finished = circle_loans
            .iter()
            .filter(|l| matches!(l.status, LoanStatus::Completed | LoanStatus::Defaulted))
            .count();
        let completed = circle_loans
            .iter()
            .filter(|l| l.status == LoanStatus::Completed)
            .count();
        let defaults = circle_loans
            .iter()
            .filter(|l| l.status == LoanStatus::Defaulted)
            .count() as u32;
        let vouch_activity = inner
            .vouches
            .values()
            .filter(|v| v.circle_id == circle_id && v.status == VouchStatus::Active)
            .count() as u32;
        Ok(CircleStats {
            repayment_rate: if finished > 0 {
                completed as f64 / finished as f64
            } else {
                1.0
            },
            vouch_activity,
            defaults,
        })
    }

    async fn create_diary_entry(&self, entry: DiaryEntry) -> Result<(), StoreError> {
        self.inner.write().unwrap().diary.push(entry);
        Ok(())
    }

    async fn get_diary_entries(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<DiaryEntry>, StoreError> {
        let inner = self.inner.read().unwrap();
        let mut entries: Vec<DiaryEntry> = inner
            .diary
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| std::cmp::Reverse(e.recorded_at));
        entries.truncate(limit);
        Ok(entries)
    }

    async fn get_user_stats(&self, user_id: Uuid) -> Result<UserStats, StoreError> {
        let inner = self.inner.read().unwrap();
        let successful_vouches = inner
            .vouches
            .values()
            .filter(|v| v.voucher_id == user_id && v.status == VouchStatus::Returned)
            .count() as u32;
        let completed_loans = inner
            .loans
            .values()
            .filter(|l| l.borrower_id == user_id && l.status == LoanStatus::Completed)
            .count() as u32;
        let lowest_trust_score = inner
            .trust_history
            .iter()
            .filter(|e| e.user_id == user_id)
            .map(|e| e.score_after)
            .min()
            .unwrap_or_else(|| {
                inner
                    .profiles
                    .get(&user_id)
                    .map(|p| p.trust_score)
                    .unwrap_or(0)
            });
        Ok(UserStats {
            successful_vouches,
            completed_loans,
            lowest_trust_score,
            member_number: inner.member_counter,
        })
    }
}
