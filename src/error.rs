//! Engine Error Taxonomy
//!
//! Every failure the core can surface, mapped to HTTP status codes at the
//! server boundary. Agents never surface errors directly; they swallow them
//! into a failed `AgentResult` and the pipeline continues.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A business invariant was violated (insufficient balance, bad vouch
    /// level, loan not in the required status, ...). Maps to 400.
    #[error("{0}")]
    Validation(String),

    /// Entity lookup failed. Maps to 404.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Duplicate vote, duplicate profile on the same phone. Maps to 400.
    #[error("{0}")]
    Conflict(String),

    /// Bad or missing credential, or bad webhook signature. Maps to 401.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Per-principal rate limit exceeded. Maps to 429 with Retry-After.
    #[error("rate limit exceeded, retry after {retry_after}s")]
    RateLimited { retry_after: u64 },

    /// An external dependency failed after the retry budget was exhausted.
    /// Maps to 502 with the dependency name.
    #[error("dependency {name} unavailable: {reason}")]
    DependencyFailure { name: &'static str, reason: String },

    /// A named circuit is open; the call was never attempted. Maps to 502.
    #[error("circuit {name} is open, retry in {retry_after}s")]
    CircuitOpen { name: &'static str, retry_after: u64 },

    /// Uncaught internal failure. Maps to 500.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    /// Whether a retry wrapper may re-attempt the failed operation.
    pub fn is_retriable(&self) -> bool {
        matches!(self, EngineError::DependencyFailure { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_kinds() {
        let dep = EngineError::DependencyFailure {
            name: "payments",
            reason: "timeout".into(),
        };
        assert!(dep.is_retriable());
        assert!(!EngineError::NotFound("loan").is_retriable());
        assert!(!EngineError::Validation("bad level".into()).is_retriable());
    }

    #[test]
    fn test_display_carries_dependency_name() {
        let err = EngineError::CircuitOpen {
            name: "llm",
            retry_after: 12,
        };
        assert!(err.to_string().contains("llm"));
        assert!(err.to_string().contains("12"));
    }
}
