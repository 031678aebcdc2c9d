//! Trust Analyzer Agent
//!
//! Breaks the trust score into its sources, grades vouch quality, predicts
//! the 30-day trajectory, and renders the bharosa meter.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::agent::{Agent, AgentContext, AgentId, AgentResult, ReasoningTrace};
use crate::domain::VouchLevel;
use crate::error::EngineError;

pub struct TrustAnalyzerAgent;

impl TrustAnalyzerAgent {
    pub fn new() -> Self {
        Self
    }

    fn analyze(&self, context: &AgentContext, trace: &mut ReasoningTrace) -> Result<Value, EngineError> {
        trace.observe_with(
            format!(
                "Trust score: {}, Vouches received: {}, Circles: {}",
                context.trust_score,
                context.vouches.len(),
                context.circles.len()
            ),
            0.95,
        );

        let components = trust_components(context);
        trace.analyze_with(
            format!(
                "Trust breakdown - Base: {}, Vouches: +{}, Repayments: +{}, Learning: +{}",
                components["base"], components["vouches"], components["repayments"],
                components["learning"]
            ),
            0.88,
        );

        let quality = vouch_quality(context);
        trace.analyze_with(
            format!(
                "Vouch quality: {} - {} strong, {} basic",
                quality["grade"], quality["strong_vouches"], quality["basic_vouches"]
            ),
            0.85,
        );

        let prediction = predict_trajectory(context);
        trace.hypothesize_with(
            format!(
                "30-day prediction: {} ({:+} change)",
                prediction["predicted_score"],
                prediction["change"].as_i64().unwrap_or(0)
            ),
            0.7,
        );

        let tips = improvement_tips(context, &components);
        let top_tip = tips
            .first()
            .and_then(|t| t["tip"].as_str())
            .map(|t| format!("Top tip: {t}"))
            .unwrap_or_else(|| "No improvements needed".to_string());
        trace.act_with(top_tip, 0.82);

        let visual = bharosa_visual(context.trust_score);
        trace.conclude_with(
            format!("Trust level: {} - {}", visual["level"], visual["message"]),
            0.9,
        );

        Ok(json!({
            "trust_score": context.trust_score,
            "components": components,
            "vouch_quality": quality,
            "prediction": prediction,
            "tips": tips,
            "bharosa_visual": visual,
        }))
    }
}

impl Default for TrustAnalyzerAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for TrustAnalyzerAgent {
    fn id(&self) -> AgentId {
        AgentId::TrustAnalyzer
    }

    async fn run(&self, context: &AgentContext) -> AgentResult {
        let user = context.user_id.simple().to_string();
        let mut trace = ReasoningTrace::new(
            self.id().as_str(),
            format!("Trust analysis for user {}...", &user[..8]),
        );
        match self.analyze(context, &mut trace) {
            Ok(result) => AgentResult::ok(self.id(), result, trace),
            Err(err) => {
                trace.reflect_with(format!("Trust analysis failed: {err}"), 0.3);
                AgentResult::failed(self.id(), err, trace)
            }
        }
    }
}

/// Attribute the trust score: base 10, vouches, repayments, circles, and
/// whatever remains goes to learning.
fn trust_components(context: &AgentContext) -> Value {
    let base = 10i64;
    let vouches = (context.active_vouches().count() as i64 * 5).min(30);
    let repayments = (context.completed_loans().count() as i64 * 10).min(40);
    let circle_participation = (context.circles.len() as i64 * 5).min(15);
    let accounted = base + vouches + repayments + circle_participation;
    let learning = (context.trust_score - accounted).max(0);
    json!({
        "base": base,
        "vouches": vouches,
        "repayments": repayments,
        "circle_participation": circle_participation,
        "learning": learning,
    })
}

fn vouch_quality(context: &AgentContext) -> Value {
    let strong = context
        .vouches
        .iter()
        .filter(|v| matches!(v.vouch_level, VouchLevel::Strong | VouchLevel::Maximum))
        .count();
    let basic = context
        .vouches
        .iter()
        .filter(|v| v.vouch_level == VouchLevel::Basic)
        .count();
    let total_staked: f64 = context.vouches.iter().map(|v| v.saathi_staked).sum();

    let grade = if strong >= 3 && total_staked >= 200.0 {
        "A"
    } else if strong >= 2 || total_staked >= 100.0 {
        "B"
    } else if context.vouches.len() >= 2 {
        "C"
    } else {
        "D"
    };

    json!({
        "grade": grade,
        "strong_vouches": strong,
        "basic_vouches": basic,
        "total_staked": total_staked,
    })
}

fn predict_trajectory(context: &AgentContext) -> Value {
    let mut change = 0i64;
    if context.active_loans().count() > 0 {
        // Assumes instalments land on time.
        change += 5;
    }
    if context.active_vouches().count() > 0 {
        change += 3;
    }
    if context.circles.len() > 1 {
        change += 2;
    }
    json!({
        "predicted_score": (context.trust_score + change).min(100),
        "change": change,
        "confidence": 0.7,
    })
}

fn improvement_tips(context: &AgentContext, components: &Value) -> Vec<Value> {
    let mut tips = Vec::new();
    if components["vouches"].as_i64().unwrap_or(0) < 20 {
        tips.push(json!({
            "tip": "Ask circle members to vouch for you",
            "potential_gain": "+5 to +15 points",
            "difficulty": "easy",
        }));
    }
    if components["repayments"].as_i64().unwrap_or(0) < 20 && context.loans.is_empty() {
        tips.push(json!({
            "tip": "Take a small loan and repay on time",
            "potential_gain": "+10 points per loan",
            "difficulty": "medium",
        }));
    }
    if components["learning"].as_i64().unwrap_or(0) < 10 {
        tips.push(json!({
            "tip": "Complete financial literacy modules",
            "potential_gain": "+2 to +5 points per module",
            "difficulty": "easy",
        }));
    }
    if context.circles.len() < 2 {
        tips.push(json!({
            "tip": "Join or create another trust circle",
            "potential_gain": "+5 points",
            "difficulty": "easy",
        }));
    }
    tips.truncate(3);
    tips
}

fn bharosa_visual(score: i64) -> Value {
    let dots = (score / 10).min(10);
    let (level, level_name, message, color) = if score >= 80 {
        ("pakka_bharosa", "Pakka Bharosa", "You are highly trusted!", "green")
    } else if score >= 60 {
        ("bhrosemand", "Bhrosemand", "People trust you well", "lime")
    } else if score >= 40 {
        ("building", "Building Trust", "Keep going, almost there!", "yellow")
    } else if score >= 20 {
        ("new", "New Member", "Get vouches to grow trust", "orange")
    } else {
        ("starting", "Just Started", "Join circles to begin", "gray")
    };
    json!({
        "score": score,
        "level": level,
        "level_name": level_name,
        "message": message,
        "color": color,
        "green_dots": dots,
        "gray_dots": 10 - dots,
        "display": format!("{dots} out of 10 people trust you"),
    })
}
