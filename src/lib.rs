//! Bharosa Engine
//!
//! Credit-decision orchestration for a trust-based P2P lending platform:
//! - Multi-agent pipeline with visible reasoning traces
//! - Six-factor risk scoring with a signable oracle payload
//! - Fraud pattern detection (velocity, collusion, behavior, sybil)
//! - Reliability kit: retries, circuit breakers, rate limiting
//! - Quadratic loan voting and trust gamification

pub mod agent;
pub mod config;
pub mod domain;
pub mod error;
pub mod orchestrator;
pub mod reliability;
pub mod server;
pub mod services;

// Re-exports for convenience
pub use agent::{AgentContext, AgentId, AgentResult, ReasoningTrace};
pub use config::Config;
pub use error::EngineError;
pub use orchestrator::Orchestrator;
