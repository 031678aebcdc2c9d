//! Action Agent
//!
//! Turns the pipeline's conclusions into a concrete next step for the
//! client: a pre-filled loan application flow, a navigation hint, or
//! nothing at all.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::agent::{Agent, AgentContext, AgentId, AgentResult, ReasoningTrace};
use crate::error::EngineError;

const DEFAULT_DRAFT_AMOUNT: f64 = 10_000.0;

pub struct ActionAgent;

impl ActionAgent {
    pub fn new() -> Self {
        Self
    }

    fn execute(&self, context: &AgentContext, trace: &mut ReasoningTrace) -> Result<Value, EngineError> {
        let intent = context
            .agent_results
            .get(AgentId::Nova)
            .and_then(|r| r["intent"].as_str())
            .unwrap_or("general")
            .to_string();
        trace.observe(format!("Detected intent for action: {intent}"));

        let result = match intent.as_str() {
            "loan_request" => self.draft_loan(context, trace),
            "check_score" => json!({
                "action": "NAVIGATE",
                "target": "/trust",
                "message": "Let's check your trust score.",
            }),
            _ => {
                trace.analyze("No specific action required for this intent.");
                json!({})
            }
        };

        trace.conclude(format!("Action execution complete: {result}"));
        Ok(result)
    }

    fn draft_loan(&self, context: &AgentContext, trace: &mut ReasoningTrace) -> Value {
        // First eligible circle; membership is the only requirement here.
        let Some(circle) = context.circles.first() else {
            trace.analyze("No eligible circle found for loan.");
            return json!({
                "success": false,
                "message": "You need to join a Circle first to get a loan.",
                "action": "NAVIGATE",
                "target": "/circles",
            });
        };
        trace.analyze(format!(
            "Selected best circle: {} (ID: {})",
            circle.name, circle.id
        ));

        let draft_amount = context
            .agent_results
            .get(AgentId::RiskOracle)
            .and_then(|r| r["recommendation"]["max_loan"].as_f64())
            .unwrap_or(DEFAULT_DRAFT_AMOUNT);

        trace.act(format!("Drafting loan application for ₹{draft_amount:.0}"));

        json!({
            "action": "GUIDE_FLOW",
            "target": "/loans/apply",
            "screen": "/loans/apply",
            "message": format!("I've prepared a loan application for ₹{draft_amount:.0}."),
            "state": {
                "amount": draft_amount,
                "circle_id": circle.id,
                "purpose": "Emergency Support",
            },
            "guide_steps": [
                { "text": format!("I've selected the '{}' circle for you.", circle.name), "target": "#circle-select", "overlay": true },
                { "text": format!("I've filled in ₹{draft_amount:.0} (your safe limit)."), "target": "#amount-input", "overlay": true },
                { "text": "Just click here to submit!", "target": "#submit-btn", "overlay": true },
            ],
        })
    }
}

impl Default for ActionAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for ActionAgent {
    fn id(&self) -> AgentId {
        AgentId::ActionAgent
    }

    async fn run(&self, context: &AgentContext) -> AgentResult {
        let mut trace = ReasoningTrace::new(
            self.id().as_str(),
            format!("Processing action for request: {}", context.current_request),
        );
        match self.execute(context, &mut trace) {
            Ok(result) => AgentResult::ok(self.id(), result, trace),
            Err(err) => {
                trace.reflect_with(format!("Action failed: {err}"), 0.0);
                AgentResult::failed(self.id(), err, trace)
            }
        }
    }
}
