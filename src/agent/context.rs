//! Agent Context
//!
//! The per-request behavioral snapshot every agent reads, plus the mutable
//! results map and trace log the orchestrator appends to between agents.
//! Created fresh per request, discarded at response time.

use std::time::Instant;

use serde_json::Value;
use uuid::Uuid;

use crate::agent::{AgentId, ReasoningTrace};
use crate::domain::{Circle, DiaryEntry, DiaryKind, Language, Loan, LoanStatus, Profile, Vouch, VouchStatus};
use crate::reliability::RequestId;

/// Insertion-order-preserving map of agent results, keyed by the producing
/// agent's canonical name.
#[derive(Debug, Clone, Default)]
pub struct AgentResults(Vec<(AgentId, Value)>);

impl AgentResults {
    pub fn insert(&mut self, agent: AgentId, result: Value) {
        if let Some(slot) = self.0.iter_mut().find(|(id, _)| *id == agent) {
            slot.1 = result;
        } else {
            self.0.push((agent, result));
        }
    }

    pub fn get(&self, agent: AgentId) -> Option<&Value> {
        self.0.iter().find(|(id, _)| *id == agent).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (AgentId, &Value)> {
        self.0.iter().map(|(id, v)| (*id, v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct AgentContext {
    pub user_id: Uuid,
    pub user_profile: Option<Profile>,
    pub trust_score: i64,
    pub saathi_balance: f64,
    pub language: Language,
    pub circles: Vec<Circle>,
    pub loans: Vec<Loan>,
    /// Vouches received by this user.
    pub vouches: Vec<Vouch>,
    pub financial_diary: Vec<DiaryEntry>,
    pub current_request: String,
    pub agent_results: AgentResults,
    pub traces: Vec<ReasoningTrace>,
    pub request_id: RequestId,
    pub deadline: Option<Instant>,
}

impl AgentContext {
    pub fn empty(user_id: Uuid) -> Self {
        Self {
            user_id,
            user_profile: None,
            trust_score: 0,
            saathi_balance: 0.0,
            language: Language::En,
            circles: Vec::new(),
            loans: Vec::new(),
            vouches: Vec::new(),
            financial_diary: Vec::new(),
            current_request: String::new(),
            agent_results: AgentResults::default(),
            traces: Vec::new(),
            request_id: RequestId::generate(),
            deadline: None,
        }
    }

    pub fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn active_loans(&self) -> impl Iterator<Item = &Loan> {
        self.loans.iter().filter(|l| l.is_active())
    }

    pub fn completed_loans(&self) -> impl Iterator<Item = &Loan> {
        self.loans
            .iter()
            .filter(|l| l.status == LoanStatus::Completed)
    }

    pub fn defaulted_loans(&self) -> impl Iterator<Item = &Loan> {
        self.loans
            .iter()
            .filter(|l| l.status == LoanStatus::Defaulted)
    }

    pub fn active_vouches(&self) -> impl Iterator<Item = &Vouch> {
        self.vouches
            .iter()
            .filter(|v| v.status == VouchStatus::Active)
    }

    pub fn income_entries(&self) -> impl Iterator<Item = &DiaryEntry> {
        self.financial_diary
            .iter()
            .filter(|e| e.kind == DiaryKind::Income && e.amount > 0.0)
    }

    /// Income recorded in the last `days` days.
    pub fn recent_income(&self, days: i64) -> Vec<f64> {
        let cutoff = chrono::Utc::now() - chrono::Duration::days(days);
        self.income_entries()
            .filter(|e| e.recorded_at >= cutoff)
            .map(|e| e.amount)
            .collect()
    }

    /// Monthly instalment burden over loans with money out the door.
    pub fn current_monthly_emi(&self) -> f64 {
        self.active_loans().map(|l| l.emi_amount * 4.0).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_agent_results_preserve_insertion_order() {
        let mut results = AgentResults::default();
        results.insert(AgentId::FraudGuard, json!({"verdict": "CLEAR"}));
        results.insert(AgentId::RiskOracle, json!({"risk_score": 0.7}));
        results.insert(AgentId::LoanAdvisor, json!({"can_borrow": true}));

        let order: Vec<AgentId> = results.iter().map(|(id, _)| id).collect();
        assert_eq!(
            order,
            vec![AgentId::FraudGuard, AgentId::RiskOracle, AgentId::LoanAdvisor]
        );
        assert_eq!(
            results.get(AgentId::RiskOracle).unwrap()["risk_score"],
            json!(0.7)
        );
    }

    #[test]
    fn test_insert_same_agent_overwrites_in_place() {
        let mut results = AgentResults::default();
        results.insert(AgentId::Nova, json!({"intent": "greeting"}));
        results.insert(AgentId::ActionAgent, json!({}));
        results.insert(AgentId::Nova, json!({"intent": "loan_request"}));
        assert_eq!(results.len(), 2);
        let order: Vec<AgentId> = results.iter().map(|(id, _)| id).collect();
        assert_eq!(order[0], AgentId::Nova);
        assert_eq!(
            results.get(AgentId::Nova).unwrap()["intent"],
            json!("loan_request")
        );
    }
}
