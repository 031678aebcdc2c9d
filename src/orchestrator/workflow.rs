//! Workflow Table
//!
//! Which agents run, in order, for each resolved intent. Agent identifiers
//! are a closed enum, so a workflow can never name an unknown agent; the
//! table itself is validated once at startup.

use std::collections::HashMap;

use crate::agent::AgentId;

pub struct WorkflowTable {
    workflows: HashMap<&'static str, Vec<AgentId>>,
}

impl WorkflowTable {
    /// The standard intent routing. Panics at startup if any workflow is
    /// empty, never at request time.
    pub fn standard() -> Self {
        let mut workflows: HashMap<&'static str, Vec<AgentId>> = HashMap::new();
        workflows.insert(
            "loan_request",
            vec![
                AgentId::FraudGuard,
                AgentId::RiskOracle,
                AgentId::LoanAdvisor,
                AgentId::ActionAgent,
            ],
        );
        workflows.insert(
            "trust_inquiry",
            vec![AgentId::TrustAnalyzer, AgentId::ActionAgent],
        );
        workflows.insert(
            "vouch_request",
            vec![AgentId::FraudGuard, AgentId::TrustAnalyzer],
        );
        workflows.insert(
            "emergency_request",
            vec![AgentId::FraudGuard, AgentId::RiskOracle, AgentId::ActionAgent],
        );

        let table = Self { workflows };
        table.validate();
        table
    }

    fn validate(&self) {
        for (intent, agents) in &self.workflows {
            assert!(!agents.is_empty(), "empty workflow for intent {intent}");
        }
    }

    /// The agent sequence for an intent, if one is defined.
    pub fn for_intent(&self, intent: &str) -> Option<&[AgentId]> {
        self.workflows.get(intent).map(Vec::as_slice)
    }
}

impl Default for WorkflowTable {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loan_request_sequence() {
        let table = WorkflowTable::standard();
        assert_eq!(
            table.for_intent("loan_request").unwrap(),
            &[
                AgentId::FraudGuard,
                AgentId::RiskOracle,
                AgentId::LoanAdvisor,
                AgentId::ActionAgent,
            ]
        );
    }

    #[test]
    fn test_unknown_intent_has_no_workflow() {
        let table = WorkflowTable::standard();
        assert!(table.for_intent("greeting").is_none());
        assert!(table.for_intent("").is_none());
    }

    #[test]
    fn test_vouch_request_skips_action() {
        let table = WorkflowTable::standard();
        assert_eq!(
            table.for_intent("vouch_request").unwrap(),
            &[AgentId::FraudGuard, AgentId::TrustAnalyzer]
        );
    }
}
