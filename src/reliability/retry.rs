//! Retry with Exponential Backoff
//!
//! Wraps a fallible async operation. Only retriable failures re-enter the
//! loop; everything else passes straight through to the caller.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::error::EngineError;

/// Backoff parameters for one wrapped operation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before the given retry: min(base * 2^attempt, max) * (0.5 + U[0,1)).
    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = (self.base_delay.as_secs_f64() * 2f64.powi(attempt as i32))
            .min(self.max_delay.as_secs_f64());
        let jitter = 0.5 + rand::thread_rng().gen::<f64>();
        Duration::from_secs_f64(exp * jitter)
    }
}

/// Run `op`, retrying retriable failures per `policy`. The final failure is
/// surfaced unchanged so the caller sees the full cause chain.
pub async fn retry_with_backoff<T, F, Fut>(
    name: &str,
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retriable() => return Err(err),
            Err(err) => {
                if attempt >= policy.max_retries {
                    warn!(
                        operation = name,
                        attempts = attempt + 1,
                        "all retry attempts exhausted: {err}"
                    );
                    return Err(err);
                }
                let delay = policy.delay_for(attempt);
                warn!(
                    operation = name,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "retriable failure: {err}, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    fn dep_failure() -> EngineError {
        EngineError::DependencyFailure {
            name: "llm",
            reason: "connection reset".into(),
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff("llm.chat", &fast_policy(), || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(dep_failure())
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retriable_bypasses_retry() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff("store.get", &fast_policy(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(EngineError::NotFound("profile"))
        })
        .await;
        assert!(matches!(result, Err(EngineError::NotFound("profile"))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_surfaces_final_failure() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff("payments", &fast_policy(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(dep_failure())
        })
        .await;
        assert!(matches!(
            result,
            Err(EngineError::DependencyFailure { name: "llm", .. })
        ));
        // Initial attempt plus max_retries.
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_delay_is_capped_and_jittered() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(4),
        };
        for attempt in 0..10 {
            let delay = policy.delay_for(attempt);
            // Cap of 4s, jitter factor in [0.5, 1.5).
            assert!(delay >= Duration::from_millis(250));
            assert!(delay < Duration::from_secs(6));
        }
    }
}
