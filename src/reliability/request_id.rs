//! Request-ID Propagation
//!
//! Every orchestrator invocation and every agent runs under an ambient
//! request ID, generated when the inbound metadata does not carry one.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Use the inbound `X-Request-ID` when present, else generate one.
    pub fn from_header(header: Option<&str>) -> Self {
        match header.filter(|h| !h.trim().is_empty()) {
            Some(id) => Self(id.trim().to_string()),
            None => Self::generate(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_header_is_kept() {
        let rid = RequestId::from_header(Some("req-123"));
        assert_eq!(rid.as_str(), "req-123");
    }

    #[test]
    fn test_missing_header_generates() {
        let rid = RequestId::from_header(None);
        assert!(!rid.as_str().is_empty());
        let blank = RequestId::from_header(Some("  "));
        assert!(!blank.as_str().is_empty());
        assert_ne!(blank.as_str(), "  ");
    }
}
