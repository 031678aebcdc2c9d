//! Agent Runtime
//!
//! The six specialist agents and the shared pieces they run on: the
//! reasoning trace, the per-request context, and the result envelope the
//! orchestrator threads between them.

pub mod action;
pub mod context;
pub mod fraud_guard;
pub mod loan_advisor;
pub mod nova;
pub mod oracle;
pub mod risk_oracle;
pub mod trace;
pub mod trust_analyzer;

pub use action::ActionAgent;
pub use context::{AgentContext, AgentResults};
pub use fraud_guard::FraudGuardAgent;
pub use loan_advisor::LoanAdvisorAgent;
pub use nova::NovaAgent;
pub use oracle::{OracleSignature, OracleSigner};
pub use risk_oracle::RiskOracleAgent;
pub use trace::{ReasoningStep, ReasoningTrace, ThoughtType, TraceDisplay};
pub use trust_analyzer::TrustAnalyzerAgent;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Closed set of agent identifiers. Workflow tables refer to agents by
/// these; an unknown name is impossible by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentId {
    Nova,
    RiskOracle,
    FraudGuard,
    LoanAdvisor,
    TrustAnalyzer,
    ActionAgent,
}

impl AgentId {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentId::Nova => "Nova",
            AgentId::RiskOracle => "RiskOracle",
            AgentId::FraudGuard => "FraudGuard",
            AgentId::LoanAdvisor => "LoanAdvisor",
            AgentId::TrustAnalyzer => "TrustAnalyzer",
            AgentId::ActionAgent => "ActionAgent",
        }
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A side effect an agent wants executed after the pipeline completes.
/// Agents never run effects mid-pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct AgentAction {
    pub kind: String,
    pub data: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentResult {
    pub agent_name: AgentId,
    pub success: bool,
    pub result: Value,
    pub trace: ReasoningTrace,
    pub next_agent: Option<AgentId>,
    pub actions: Vec<AgentAction>,
}

impl AgentResult {
    pub fn ok(agent: AgentId, result: Value, trace: ReasoningTrace) -> Self {
        Self {
            agent_name: agent,
            success: true,
            result,
            trace,
            next_agent: None,
            actions: Vec::new(),
        }
    }

    pub fn with_next(mut self, next: AgentId) -> Self {
        self.next_agent = Some(next);
        self
    }

    pub fn with_actions(mut self, actions: Vec<AgentAction>) -> Self {
        self.actions = actions;
        self
    }

    /// Failure envelope: the error is swallowed into the result payload and
    /// a low-confidence reflection, never propagated.
    pub fn failed(agent: AgentId, error: impl std::fmt::Display, trace: ReasoningTrace) -> Self {
        Self {
            agent_name: agent,
            success: false,
            result: serde_json::json!({ "error": error.to_string() }),
            trace,
            next_agent: None,
            actions: Vec::new(),
        }
    }
}

#[async_trait]
pub trait Agent: Send + Sync {
    fn id(&self) -> AgentId;

    /// Execute against the shared context. Implementations catch their own
    /// failures and return a failed result; this never errors.
    async fn run(&self, context: &AgentContext) -> AgentResult;
}
