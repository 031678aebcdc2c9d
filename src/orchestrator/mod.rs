//! Orchestrator
//!
//! Assembles the per-request context from the store, drives the agent
//! pipeline per the workflow table, aggregates every reasoning trace, and
//! synthesizes the final response. One agent failing never fails the
//! pipeline; the synthesizer tolerates missing results.

pub mod workflow;

pub use workflow::WorkflowTable;

use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::agent::{
    ActionAgent, Agent, AgentContext, AgentId, AgentResult, FraudGuardAgent, LoanAdvisorAgent,
    NovaAgent, OracleSigner, ReasoningTrace, RiskOracleAgent, TraceDisplay, TrustAnalyzerAgent,
};
use crate::config::Config;
use crate::domain::Language;
use crate::reliability::RequestId;
use crate::services::Services;

/// Bounded wait for each context-assembly read.
const CONTEXT_READ_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Serialize)]
pub struct ChatOutcome {
    pub response: Option<String>,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screen: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guide_steps: Option<Value>,
    pub reasoning_traces: Vec<TraceDisplay>,
    pub reasoning_traces_raw: Vec<ReasoningTrace>,
    pub agents_used: Vec<String>,
    pub intent: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoanDecision {
    pub approved: bool,
    pub approved_amount: f64,
    pub requested_amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_category: Option<String>,
    pub recommendation: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
    pub reasoning_traces: Vec<TraceDisplay>,
    pub reasoning_traces_raw: Vec<ReasoningTrace>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VouchAssessment {
    pub recommended: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub vouchee_trust_score: i64,
    pub vouch_quality_grade: String,
    pub reasoning_traces: Vec<TraceDisplay>,
}

struct SynthesizedResponse {
    message: String,
    action: Option<String>,
    target: Option<String>,
    screen: Option<String>,
    data: Option<Value>,
    guide_steps: Option<Value>,
}

pub struct Orchestrator {
    services: Services,
    nova: NovaAgent,
    risk_oracle: RiskOracleAgent,
    fraud_guard: FraudGuardAgent,
    loan_advisor: LoanAdvisorAgent,
    trust_analyzer: TrustAnalyzerAgent,
    action_agent: ActionAgent,
    workflows: WorkflowTable,
    request_timeout: Duration,
}

impl Orchestrator {
    pub fn new(services: Services, config: &Config) -> Self {
        Self {
            nova: NovaAgent::new(services.llm.clone()),
            risk_oracle: RiskOracleAgent::new(OracleSigner::new(
                config.oracle_signing_key.clone(),
            )),
            fraud_guard: FraudGuardAgent::new(),
            loan_advisor: LoanAdvisorAgent::new(),
            trust_analyzer: TrustAnalyzerAgent::new(),
            action_agent: ActionAgent::new(),
            workflows: WorkflowTable::standard(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            services,
        }
    }

    fn agent(&self, id: AgentId) -> &dyn Agent {
        match id {
            AgentId::Nova => &self.nova,
            AgentId::RiskOracle => &self.risk_oracle,
            AgentId::FraudGuard => &self.fraud_guard,
            AgentId::LoanAdvisor => &self.loan_advisor,
            AgentId::TrustAnalyzer => &self.trust_analyzer,
            AgentId::ActionAgent => &self.action_agent,
        }
    }

    /// Load the behavioral snapshot. Reads run concurrently, each under a
    /// bounded timeout; a failed read defaults its field and the request
    /// continues.
    pub async fn build_context(&self, user_id: Uuid, request_id: RequestId) -> AgentContext {
        let store = &self.services.store;
        let (profile, vouches, loans, circles, diary) = tokio::join!(
            tokio::time::timeout(CONTEXT_READ_TIMEOUT, store.get_profile(user_id)),
            tokio::time::timeout(CONTEXT_READ_TIMEOUT, store.get_vouches_received(user_id)),
            tokio::time::timeout(CONTEXT_READ_TIMEOUT, store.get_user_loans(user_id)),
            tokio::time::timeout(CONTEXT_READ_TIMEOUT, store.get_user_circles(user_id)),
            tokio::time::timeout(CONTEXT_READ_TIMEOUT, store.get_diary_entries(user_id, 50)),
        );

        let mut context = AgentContext::empty(user_id);
        context.request_id = request_id;
        if let Ok(Ok(profile)) = profile {
            context.trust_score = profile.trust_score;
            context.saathi_balance = profile.saathi_balance;
            context.language = profile.language;
            context.user_profile = Some(profile);
        }
        context.vouches = vouches.map(Result::unwrap_or_default).unwrap_or_default();
        context.loans = loans.map(Result::unwrap_or_default).unwrap_or_default();
        context.circles = circles.map(Result::unwrap_or_default).unwrap_or_default();
        context.financial_diary = diary.map(Result::unwrap_or_default).unwrap_or_default();
        context
    }

    async fn run_agent(&self, id: AgentId, context: &mut AgentContext) -> AgentResult {
        info!(request_id = %context.request_id, agent = %id, "running agent");
        let result = self.agent(id).run(context).await;
        if !result.success {
            warn!(
                request_id = %context.request_id,
                agent = %id,
                "agent failed, pipeline continues: {}",
                result.result["error"]
            );
        }
        context.agent_results.insert(id, result.result.clone());
        context.traces.push(result.trace.clone());
        result
    }

    /// Full chat pipeline: Nova resolves intent, specialists run per the
    /// workflow table, the synthesizer picks the payload.
    pub async fn process_message(
        &self,
        user_id: Uuid,
        message: &str,
        language: Language,
        request_id: RequestId,
    ) -> ChatOutcome {
        let started = Instant::now();

        let mut context = self.build_context(user_id, request_id).await;
        context.current_request = message.to_string();
        context.language = language;
        context.deadline = Some(started + self.request_timeout);

        let nova_result = self.run_agent(AgentId::Nova, &mut context).await;
        let intent = nova_result.result["intent"].as_str().map(str::to_string);

        let mut pipeline_results = vec![nova_result.clone()];
        if let Some(next_agent) = nova_result.next_agent {
            let workflow: Vec<AgentId> = intent
                .as_deref()
                .and_then(|i| self.workflows.for_intent(i))
                .map(|workflow| workflow.to_vec())
                .unwrap_or_else(|| vec![next_agent]);

            for agent_id in workflow {
                if context.deadline_passed() {
                    warn!(request_id = %context.request_id, "request deadline hit, stopping pipeline");
                    break;
                }
                let result = self.run_agent(agent_id, &mut context).await;
                pipeline_results.push(result);
            }
        }

        let synthesized = self.synthesize(&context);
        self.execute_actions(&context, &pipeline_results);

        ChatOutcome {
            response: Some(synthesized.message.clone()),
            message: Some(synthesized.message),
            action: synthesized.action,
            target: synthesized.target,
            screen: synthesized.screen,
            data: synthesized.data,
            guide_steps: synthesized.guide_steps,
            reasoning_traces: context.traces.iter().map(ReasoningTrace::to_display).collect(),
            agents_used: context
                .traces
                .iter()
                .map(|t| t.agent_name.clone())
                .collect(),
            reasoning_traces_raw: context.traces,
            intent,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Loan pipeline: FraudGuard gate, then risk scoring and affordability.
    pub async fn process_loan_request(
        &self,
        user_id: Uuid,
        amount: f64,
        purpose: &str,
        _circle_id: Uuid,
        request_id: RequestId,
    ) -> LoanDecision {
        let mut context = self.build_context(user_id, request_id).await;
        context.current_request = format!("Loan request: ₹{amount} for {purpose}");

        let fraud = self.run_agent(AgentId::FraudGuard, &mut context).await;
        if fraud.result["verdict"] == "BLOCK" {
            return LoanDecision {
                approved: false,
                approved_amount: 0.0,
                requested_amount: amount,
                risk_category: None,
                recommendation: json!({}),
                reason: Some("Security check failed".into()),
                advice: None,
                suggested_action: None,
                reasoning_traces: context.traces.iter().map(ReasoningTrace::to_display).collect(),
                reasoning_traces_raw: context.traces,
            };
        }

        let risk = self.run_agent(AgentId::RiskOracle, &mut context).await;
        let advisor = self.run_agent(AgentId::LoanAdvisor, &mut context).await;
        self.execute_actions(&context, &[fraud, risk.clone(), advisor.clone()]);

        let recommendation = advisor.result["recommendation"].clone();
        let can_borrow = recommendation["can_borrow"] == true;
        let risk_category = risk.result["risk_category"].as_str().map(str::to_string);

        if can_borrow {
            let advisor_max = recommendation["max_amount"].as_f64().unwrap_or(0.0);
            let oracle_max = risk.result["recommendation"]["max_loan"]
                .as_f64()
                .unwrap_or(0.0);
            LoanDecision {
                approved: true,
                approved_amount: amount.min(advisor_max).min(oracle_max),
                requested_amount: amount,
                risk_category,
                recommendation,
                reason: None,
                advice: None,
                suggested_action: None,
                reasoning_traces: context.traces.iter().map(ReasoningTrace::to_display).collect(),
                reasoning_traces_raw: context.traces,
            }
        } else {
            LoanDecision {
                approved: false,
                approved_amount: 0.0,
                requested_amount: amount,
                risk_category,
                recommendation: recommendation.clone(),
                reason: recommendation["reason"].as_str().map(str::to_string),
                advice: recommendation["advice"].as_str().map(str::to_string),
                suggested_action: recommendation["suggested_action"]
                    .as_str()
                    .map(str::to_string),
                reasoning_traces: context.traces.iter().map(ReasoningTrace::to_display).collect(),
                reasoning_traces_raw: context.traces,
            }
        }
    }

    /// Vouch pipeline: fraud check on the vouchee, then network quality.
    pub async fn process_vouch_request(
        &self,
        _voucher_id: Uuid,
        vouchee_id: Uuid,
        _circle_id: Uuid,
        vouch_level: &str,
        request_id: RequestId,
    ) -> VouchAssessment {
        let mut context = self.build_context(vouchee_id, request_id).await;
        context.current_request = format!("Vouch request: {vouch_level} level");

        let fraud = self.run_agent(AgentId::FraudGuard, &mut context).await;
        if fraud.result["verdict"] == "BLOCK" {
            return VouchAssessment {
                recommended: false,
                reason: Some("Security concerns with this user".into()),
                vouchee_trust_score: context.trust_score,
                vouch_quality_grade: "D".into(),
                reasoning_traces: context.traces.iter().map(ReasoningTrace::to_display).collect(),
            };
        }

        let trust = self.run_agent(AgentId::TrustAnalyzer, &mut context).await;
        let grade = trust.result["vouch_quality"]["grade"]
            .as_str()
            .unwrap_or("C")
            .to_string();

        VouchAssessment {
            recommended: true,
            reason: None,
            vouchee_trust_score: context.trust_score,
            vouch_quality_grade: grade,
            reasoning_traces: context.traces.iter().map(ReasoningTrace::to_display).collect(),
        }
    }

    /// Response synthesis: a concrete action beats free text, Nova beats the
    /// specialists, and there is always a fallback.
    fn synthesize(&self, context: &AgentContext) -> SynthesizedResponse {
        let results = &context.agent_results;

        if let Some(action_result) = results.get(AgentId::ActionAgent) {
            if action_result["action"].is_string() {
                return SynthesizedResponse {
                    message: action_result["message"]
                        .as_str()
                        .unwrap_or("I'm on it!")
                        .to_string(),
                    action: action_result["action"].as_str().map(str::to_string),
                    target: action_result["target"].as_str().map(str::to_string),
                    screen: action_result["screen"].as_str().map(str::to_string),
                    data: action_result.get("state").cloned(),
                    guide_steps: action_result.get("guide_steps").cloned(),
                };
            }
        }

        let text = |message: String| SynthesizedResponse {
            message,
            action: None,
            target: None,
            screen: None,
            data: None,
            guide_steps: None,
        };

        if let Some(response) = results
            .get(AgentId::Nova)
            .and_then(|r| r["response"].as_str())
        {
            return text(response.to_string());
        }

        if let Some(rec) = results
            .get(AgentId::LoanAdvisor)
            .map(|r| &r["recommendation"])
            .filter(|rec| rec.is_object())
        {
            let message = if rec["can_borrow"] == true {
                rec["explanation"].as_str().unwrap_or("You can apply for a loan!")
            } else {
                rec["advice"].as_str().unwrap_or("Let me help you qualify.")
            };
            return text(message.to_string());
        }

        if let Some(visual) = results
            .get(AgentId::TrustAnalyzer)
            .map(|r| &r["bharosa_visual"])
            .filter(|v| v.is_object())
        {
            return text(format!(
                "{} - {}",
                visual["display"].as_str().unwrap_or(""),
                visual["message"].as_str().unwrap_or("")
            ));
        }

        text("How can I help you today?".to_string())
    }

    /// Declared side effects run only after the pipeline completes, through
    /// the background task manager so nothing here blocks the response.
    fn execute_actions(&self, context: &AgentContext, results: &[AgentResult]) {
        for result in results {
            for action in &result.actions {
                match action.kind.as_str() {
                    "update_blockchain_oracle" => {
                        let blockchain = self.services.blockchain.clone();
                        let wallet = context
                            .user_profile
                            .as_ref()
                            .and_then(|p| p.wallet_address.clone());
                        let score = action.data["risk_score"].as_i64().unwrap_or(0) / 100;
                        self.services.tasks.spawn("oracle.publish", async move {
                            if let Some(wallet) = wallet {
                                blockchain
                                    .update_trust_score(&wallet, score, "risk oracle report")
                                    .await?;
                            }
                            Ok(())
                        });
                    }
                    "log_fraud_check" => {
                        warn!(
                            request_id = %context.request_id,
                            verdict = %action.data["verdict"],
                            risk = %action.data["risk"],
                            "fraud check flagged"
                        );
                    }
                    other => {
                        warn!(kind = other, "unknown agent action, skipping");
                    }
                }
            }
        }
    }
}
