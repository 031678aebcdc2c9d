//! Persisted Record Types
//!
//! The semantic contract for everything the store port reads and writes.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Supported user-facing languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    #[default]
    En,
    Hi,
    Ml,
}

impl Language {
    pub fn parse(code: &str) -> Self {
        match code {
            "hi" => Language::Hi,
            "ml" => Language::Ml,
            _ => Language::En,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Hi => "hi",
            Language::Ml => "ml",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProfileMetadata {
    #[serde(default)]
    pub streak_days: u32,
    #[serde(default)]
    pub last_active_date: Option<NaiveDate>,
    #[serde(default)]
    pub badges: Vec<String>,
    #[serde(default)]
    pub xp: u64,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub phone: String,
    pub full_name: String,
    pub language: Language,
    pub wallet_address: Option<String>,
    /// Integer in [0, 100].
    pub trust_score: i64,
    pub saathi_balance: f64,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: ProfileMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Voting,
    Approved,
    Disbursed,
    Repaying,
    Completed,
    Defaulted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loan {
    pub id: Uuid,
    pub borrower_id: Uuid,
    pub circle_id: Uuid,
    pub amount: f64,
    pub purpose: String,
    pub tenure_days: u32,
    /// Weekly instalment.
    pub emi_amount: f64,
    pub status: LoanStatus,
    pub risk_category: Option<String>,
    pub blockchain_tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub disbursed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Loan {
    /// A loan with money currently out the door.
    pub fn is_active(&self) -> bool {
        matches!(self.status, LoanStatus::Disbursed | LoanStatus::Repaying)
    }
}

/// Partial update applied by the store to a loan row.
#[derive(Debug, Clone, Default)]
pub struct LoanUpdate {
    pub status: Option<LoanStatus>,
    pub blockchain_tx_hash: Option<String>,
    pub disbursed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VouchLevel {
    Basic,
    Strong,
    Maximum,
}

impl VouchLevel {
    pub fn parse(level: &str) -> Option<Self> {
        match level {
            "basic" => Some(VouchLevel::Basic),
            "strong" => Some(VouchLevel::Strong),
            "maximum" => Some(VouchLevel::Maximum),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VouchLevel::Basic => "basic",
            VouchLevel::Strong => "strong",
            VouchLevel::Maximum => "maximum",
        }
    }

    /// Quality weight used by the risk oracle's vouch-strength factor.
    pub fn weight(&self) -> u32 {
        match self {
            VouchLevel::Basic => 1,
            VouchLevel::Strong => 2,
            VouchLevel::Maximum => 3,
        }
    }

    pub fn min_stake(&self) -> f64 {
        match self {
            VouchLevel::Basic => 10.0,
            VouchLevel::Strong => 50.0,
            VouchLevel::Maximum => 200.0,
        }
    }

    pub fn max_stake(&self) -> f64 {
        match self {
            VouchLevel::Basic => 50.0,
            VouchLevel::Strong => 200.0,
            VouchLevel::Maximum => 500.0,
        }
    }

    /// Trust-score points granted to the vouchee.
    pub fn trust_impact(&self) -> i64 {
        match self {
            VouchLevel::Basic => 5,
            VouchLevel::Strong => 10,
            VouchLevel::Maximum => 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VouchStatus {
    Active,
    Returned,
    Slashed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vouch {
    pub id: Uuid,
    pub voucher_id: Uuid,
    pub vouchee_id: Uuid,
    pub circle_id: Uuid,
    pub vouch_level: VouchLevel,
    pub saathi_staked: f64,
    pub status: VouchStatus,
    pub blockchain_tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Circle {
    pub id: Uuid,
    pub name: String,
    pub invite_code: String,
    pub member_count: u32,
    pub max_members: u32,
    pub emergency_fund: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircleMember {
    pub circle_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
}

/// Aggregated per-circle activity used by the leaderboard.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CircleStats {
    pub repayment_rate: f64,
    pub vouch_activity: u32,
    pub defaults: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiaryKind {
    Income,
    Expense,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiaryEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: DiaryKind,
    pub amount: f64,
    pub category: Option<String>,
    pub note: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaathiTxKind {
    Stake,
    Unstake,
    Reward,
    Slash,
    Earn,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaathiTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: SaathiTxKind,
    pub amount: f64,
    pub reference_id: Option<String>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepaymentStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repayment {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub amount: f64,
    /// Payment-gateway id, the idempotency key for webhook processing.
    pub payment_id: String,
    pub status: RepaymentStatus,
    pub blockchain_tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanVote {
    pub loan_id: Uuid,
    pub voter_id: Uuid,
    pub support: bool,
    pub tokens_spent: u32,
    pub vote_weight: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustScoreEvent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub delta: i64,
    pub score_after: i64,
    pub reason: String,
    pub tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Rolled-up counters used by badge predicates.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserStats {
    pub successful_vouches: u32,
    pub completed_loans: u32,
    pub lowest_trust_score: i64,
    pub member_number: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vouch_level_bounds() {
        assert_eq!(VouchLevel::Basic.weight(), 1);
        assert_eq!(VouchLevel::Maximum.weight(), 3);
        assert_eq!(VouchLevel::Strong.min_stake(), 50.0);
        assert_eq!(VouchLevel::Strong.max_stake(), 200.0);
        assert_eq!(VouchLevel::Maximum.trust_impact(), 20);
        assert_eq!(VouchLevel::parse("strong"), Some(VouchLevel::Strong));
        assert_eq!(VouchLevel::parse("mega"), None);
    }

    #[test]
    fn test_language_parse_defaults_to_en() {
        assert_eq!(Language::parse("hi"), Language::Hi);
        assert_eq!(Language::parse("fr"), Language::En);
    }

    #[test]
    fn test_status_serde_shape() {
        let json = serde_json::to_string(&LoanStatus::Disbursed).unwrap();
        assert_eq!(json, "\"disbursed\"");
        let level: VouchLevel = serde_json::from_str("\"maximum\"").unwrap();
        assert_eq!(level, VouchLevel::Maximum);
    }
}
