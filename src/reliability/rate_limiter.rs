//! Rate Limiter
//!
//! Fixed one-minute sliding window per principal. Authenticated requests are
//! keyed by their bearer credential, anonymous ones by client address.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: u64 },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

pub struct RateLimiter {
    limit: u32,
    // Outer map guarded for structure, hit lists guarded per key.
    windows: RwLock<HashMap<String, Arc<Mutex<Vec<Instant>>>>>,
}

impl RateLimiter {
    pub fn new(limit_per_minute: u32) -> Self {
        Self {
            limit: limit_per_minute,
            windows: RwLock::new(HashMap::new()),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Record one hit for `key` and decide whether it is within the window.
    pub fn check(&self, key: &str) -> RateDecision {
        let window = self.window_for(key);
        let mut hits = window.lock().unwrap();

        let cutoff = Instant::now() - WINDOW;
        hits.retain(|t| *t > cutoff);

        if hits.len() as u32 >= self.limit {
            return RateDecision::Limited {
                retry_after: WINDOW.as_secs(),
            };
        }
        hits.push(Instant::now());
        RateDecision::Allowed {
            remaining: self.limit - hits.len() as u32,
        }
    }

    fn window_for(&self, key: &str) -> Arc<Mutex<Vec<Instant>>> {
        if let Some(window) = self.windows.read().unwrap().get(key) {
            return window.clone();
        }
        let mut windows = self.windows.write().unwrap();
        windows
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
            .clone()
    }
}

/// Derive the limiter key for a request: bearer credential if present,
/// otherwise the client address.
pub fn principal_key(authorization: Option<&str>, client_addr: &str) -> String {
    match authorization.filter(|a| !a.is_empty()) {
        Some(auth) => {
            let mut hasher = DefaultHasher::new();
            auth.hash(&mut hasher);
            format!("auth:{}", hasher.finish() % 10000)
        }
        None => format!("ip:{client_addr}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_up_to_limit() {
        let limiter = RateLimiter::new(5);
        for i in 0..5 {
            let decision = limiter.check("ip:10.0.0.1");
            assert!(decision.is_allowed(), "hit {i} should pass");
        }
        assert_eq!(
            limiter.check("ip:10.0.0.1"),
            RateDecision::Limited { retry_after: 60 }
        );
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::new(1);
        assert!(limiter.check("ip:a").is_allowed());
        assert!(limiter.check("ip:b").is_allowed());
        assert!(!limiter.check("ip:a").is_allowed());
    }

    #[test]
    fn test_remaining_counts_down() {
        let limiter = RateLimiter::new(3);
        assert_eq!(limiter.check("k"), RateDecision::Allowed { remaining: 2 });
        assert_eq!(limiter.check("k"), RateDecision::Allowed { remaining: 1 });
        assert_eq!(limiter.check("k"), RateDecision::Allowed { remaining: 0 });
    }

    #[test]
    fn test_principal_key_prefers_credential() {
        let keyed = principal_key(Some("Bearer token-a"), "1.2.3.4");
        assert!(keyed.starts_with("auth:"));
        assert_eq!(principal_key(None, "1.2.3.4"), "ip:1.2.3.4");
        // Same credential from different addresses shares the window.
        assert_eq!(
            principal_key(Some("Bearer token-a"), "1.2.3.4"),
            principal_key(Some("Bearer token-a"), "5.6.7.8"),
        );
    }
}
