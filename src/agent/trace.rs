//! Reasoning Trace
//!
//! Append-only record of the typed thought steps an agent produces while
//! working a task. Every completed trace ends with a CONCLUSION step; the
//! aggregate confidence is the arithmetic mean over all steps.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Instant;
use tracing::error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThoughtType {
    Observation,
    Analysis,
    Hypothesis,
    Action,
    Reflection,
    Conclusion,
}

impl ThoughtType {
    pub fn default_confidence(&self) -> f64 {
        match self {
            ThoughtType::Observation => 0.9,
            ThoughtType::Analysis => 0.8,
            ThoughtType::Hypothesis => 0.7,
            ThoughtType::Action => 0.85,
            ThoughtType::Reflection => 0.75,
            ThoughtType::Conclusion => 0.85,
        }
    }

    /// Presentation glyph for the display form of a trace.
    pub fn glyph(&self) -> &'static str {
        match self {
            ThoughtType::Observation => "👁",
            ThoughtType::Analysis => "🔍",
            ThoughtType::Hypothesis => "💡",
            ThoughtType::Action => "⚡",
            ThoughtType::Reflection => "🤔",
            ThoughtType::Conclusion => "✅",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReasoningStep {
    /// 1-based, contiguous within the trace.
    pub index: usize,
    pub kind: ThoughtType,
    pub content: String,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReasoningTrace {
    pub id: String,
    pub agent_name: String,
    pub task: String,
    pub steps: Vec<ReasoningStep>,
    pub final_decision: Option<String>,
    pub aggregate_confidence: f64,
    pub duration_ms: u64,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    started: Option<Instant>,
}

/// Presentation form of a trace for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct TraceDisplay {
    pub agent: String,
    pub task: String,
    pub steps: Vec<String>,
    pub final_decision: Option<String>,
    pub confidence: f64,
}

impl ReasoningTrace {
    pub fn new(agent_name: impl Into<String>, task: impl Into<String>) -> Self {
        let agent_name = agent_name.into();
        Self {
            id: format!("{}_{}", agent_name, Uuid::new_v4().simple()),
            agent_name,
            task: task.into(),
            steps: Vec::new(),
            final_decision: None,
            aggregate_confidence: 0.0,
            duration_ms: 0,
            created_at: Utc::now(),
            started: Some(Instant::now()),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.final_decision.is_some()
    }

    pub fn observe(&mut self, content: impl Into<String>) -> &mut Self {
        self.append(ThoughtType::Observation, content.into(), None)
    }

    pub fn observe_with(&mut self, content: impl Into<String>, confidence: f64) -> &mut Self {
        self.append(ThoughtType::Observation, content.into(), Some(confidence))
    }

    pub fn analyze(&mut self, content: impl Into<String>) -> &mut Self {
        self.append(ThoughtType::Analysis, content.into(), None)
    }

    pub fn analyze_with(&mut self, content: impl Into<String>, confidence: f64) -> &mut Self {
        self.append(ThoughtType::Analysis, content.into(), Some(confidence))
    }

    pub fn hypothesize(&mut self, content: impl Into<String>) -> &mut Self {
        self.append(ThoughtType::Hypothesis, content.into(), None)
    }

    pub fn hypothesize_with(&mut self, content: impl Into<String>, confidence: f64) -> &mut Self {
        self.append(ThoughtType::Hypothesis, content.into(), Some(confidence))
    }

    pub fn act(&mut self, content: impl Into<String>) -> &mut Self {
        self.append(ThoughtType::Action, content.into(), None)
    }

    pub fn act_with(&mut self, content: impl Into<String>, confidence: f64) -> &mut Self {
        self.append(ThoughtType::Action, content.into(), Some(confidence))
    }

    pub fn reflect(&mut self, content: impl Into<String>) -> &mut Self {
        self.append(ThoughtType::Reflection, content.into(), None)
    }

    pub fn reflect_with(&mut self, content: impl Into<String>, confidence: f64) -> &mut Self {
        self.append(ThoughtType::Reflection, content.into(), Some(confidence))
    }

    /// Terminal step. Sets the final decision and freezes the trace; any
    /// later append is a programming error and is dropped.
    pub fn conclude(&mut self, decision: impl Into<String>) -> &mut Self {
        self.conclude_with(decision, ThoughtType::Conclusion.default_confidence())
    }

    pub fn conclude_with(&mut self, decision: impl Into<String>, confidence: f64) -> &mut Self {
        let decision = decision.into();
        self.append(ThoughtType::Conclusion, decision.clone(), Some(confidence));
        self.final_decision = Some(decision);
        self.duration_ms = self
            .started
            .map(|s| s.elapsed().as_millis() as u64)
            .unwrap_or(0);
        self
    }

    fn append(&mut self, kind: ThoughtType, content: String, confidence: Option<f64>) -> &mut Self {
        if self.is_complete() {
            debug_assert!(false, "append to a concluded trace");
            error!(trace = %self.id, "ignoring append to concluded trace");
            return self;
        }
        let confidence = confidence
            .unwrap_or_else(|| kind.default_confidence())
            .clamp(0.0, 1.0);
        self.steps.push(ReasoningStep {
            index: self.steps.len() + 1,
            kind,
            content,
            confidence,
            timestamp: Utc::now(),
            metadata: Map::new(),
        });
        self.aggregate_confidence =
            self.steps.iter().map(|s| s.confidence).sum::<f64>() / self.steps.len() as f64;
        self
    }

    pub fn to_display(&self) -> TraceDisplay {
        TraceDisplay {
            agent: self.agent_name.clone(),
            task: self.task.clone(),
            steps: self
                .steps
                .iter()
                .map(|s| format!("{} [{:.0}%] {}", s.kind.glyph(), s.confidence * 100.0, s.content))
                .collect(),
            final_decision: self.final_decision.clone(),
            confidence: self.aggregate_confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_are_contiguous_from_one() {
        let mut trace = ReasoningTrace::new("RiskOracle", "assess");
        trace.observe("a").analyze("b").hypothesize("c");
        trace.conclude("done");
        let indices: Vec<usize> = trace.steps.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_aggregate_is_mean_of_confidences() {
        let mut trace = ReasoningTrace::new("FraudGuard", "check");
        trace.observe_with("a", 0.9).analyze_with("b", 0.7);
        assert!((trace.aggregate_confidence - 0.8).abs() < 1e-9);
        assert_eq!(ReasoningTrace::new("x", "y").aggregate_confidence, 0.0);
    }

    #[test]
    fn test_default_confidences() {
        let mut trace = ReasoningTrace::new("Nova", "chat");
        trace
            .observe("o")
            .analyze("a")
            .hypothesize("h")
            .act("ac")
            .reflect("r");
        let confidences: Vec<f64> = trace.steps.iter().map(|s| s.confidence).collect();
        assert_eq!(confidences, vec![0.9, 0.8, 0.7, 0.85, 0.75]);
        trace.conclude("c");
        assert_eq!(trace.steps.last().unwrap().confidence, 0.85);
    }

    #[test]
    fn test_final_decision_iff_concluded() {
        let mut trace = ReasoningTrace::new("Nova", "chat");
        trace.observe("looking");
        assert!(trace.final_decision.is_none());
        trace.conclude("answered");
        assert_eq!(trace.final_decision.as_deref(), Some("answered"));
        assert_eq!(trace.steps.last().unwrap().kind, ThoughtType::Conclusion);
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn test_append_after_conclude_is_dropped() {
        let mut trace = ReasoningTrace::new("Nova", "chat");
        trace.conclude("done");
        trace.observe("too late");
        assert_eq!(trace.steps.len(), 1);
    }

    #[test]
    fn test_display_carries_glyphs() {
        let mut trace = ReasoningTrace::new("TrustAnalyzer", "analyze");
        trace.observe("saw things");
        trace.conclude("trusted");
        let display = trace.to_display();
        assert_eq!(display.agent, "TrustAnalyzer");
        assert!(display.steps[0].starts_with("👁"));
        assert_eq!(display.final_decision.as_deref(), Some("trusted"));
    }
}
