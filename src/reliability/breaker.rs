//! Circuit Breaker
//!
//! Per-dependency failure isolation. While a circuit is OPEN, calls fail
//! fast without touching the wrapped operation; after the recovery timeout
//! a single probe is let through.

use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lazy_static::lazy_static;
use tracing::{info, warn};

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_at: Option<Instant>,
    probe_in_flight: bool,
}

pub struct CircuitBreaker {
    name: &'static str,
    failure_threshold: u32,
    recovery_timeout: Duration,
    success_threshold: u32,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: &'static str) -> Self {
        Self::with_thresholds(name, 5, Duration::from_secs(30), 2)
    }

    pub fn with_thresholds(
        name: &'static str,
        failure_threshold: u32,
        recovery_timeout: Duration,
        success_threshold: u32,
    ) -> Self {
        Self {
            name,
            failure_threshold,
            recovery_timeout,
            success_threshold,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure_at: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    /// Run `op` under this breaker. Fails fast with `CircuitOpen` while the
    /// circuit is open or a half-open probe is already in flight.
    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T, EngineError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        self.try_acquire()?;
        match op().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(err)
            }
        }
    }

    fn try_acquire(&self) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure_at
                    .map(|at| at.elapsed())
                    .unwrap_or(self.recovery_timeout);
                if elapsed >= self.recovery_timeout {
                    info!(circuit = self.name, "OPEN -> HALF_OPEN");
                    inner.state = CircuitState::HalfOpen;
                    inner.success_count = 0;
                    inner.probe_in_flight = true;
                    Ok(())
                } else {
                    let retry_after = (self.recovery_timeout - elapsed).as_secs().max(1);
                    Err(EngineError::CircuitOpen {
                        name: self.name,
                        retry_after,
                    })
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    Err(EngineError::CircuitOpen {
                        name: self.name,
                        retry_after: 1,
                    })
                } else {
                    inner.probe_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.probe_in_flight = false;
        match inner.state {
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.success_threshold {
                    info!(circuit = self.name, "HALF_OPEN -> CLOSED");
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                }
            }
            CircuitState::Closed => inner.failure_count = 0,
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.probe_in_flight = false;
        inner.failure_count += 1;
        inner.last_failure_at = Some(Instant::now());
        match inner.state {
            CircuitState::HalfOpen => {
                warn!(circuit = self.name, "HALF_OPEN -> OPEN");
                inner.state = CircuitState::Open;
            }
            CircuitState::Closed => {
                if inner.failure_count >= self.failure_threshold {
                    warn!(
                        circuit = self.name,
                        failures = inner.failure_count,
                        "CLOSED -> OPEN"
                    );
                    inner.state = CircuitState::Open;
                }
            }
            CircuitState::Open => {}
        }
    }
}

lazy_static! {
    pub static ref PAYMENTS_BREAKER: CircuitBreaker = CircuitBreaker::new("payments");
    pub static ref MESSAGING_BREAKER: CircuitBreaker = CircuitBreaker::new("messaging");
    pub static ref LLM_BREAKER: CircuitBreaker = CircuitBreaker::new("llm");
    pub static ref BLOCKCHAIN_BREAKER: CircuitBreaker = CircuitBreaker::new("blockchain");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn dep_failure() -> EngineError {
        EngineError::DependencyFailure {
            name: "payments",
            reason: "503".into(),
        }
    }

    async fn fail(breaker: &CircuitBreaker) -> Result<(), EngineError> {
        breaker.call(|| async { Err::<(), _>(dep_failure()) }).await
    }

    #[tokio::test]
    async fn test_opens_after_failure_threshold() {
        let breaker = CircuitBreaker::with_thresholds("t1", 3, Duration::from_secs(30), 2);
        for _ in 0..3 {
            let _ = fail(&breaker).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        // Next call fails fast without invoking the operation.
        let calls = AtomicU32::new(0);
        let result = breaker
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, EngineError>(())
            })
            .await;
        assert!(matches!(result, Err(EngineError::CircuitOpen { name: "t1", .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_recovers_through_half_open() {
        let breaker = CircuitBreaker::with_thresholds("t2", 1, Duration::from_millis(10), 2);
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(20)).await;

        // Probe succeeds twice -> closed again.
        breaker.call(|| async { Ok::<_, EngineError>(()) }).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.call(|| async { Ok::<_, EngineError>(()) }).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let breaker = CircuitBreaker::with_thresholds("t3", 1, Duration::from_millis(10), 2);
        let _ = fail(&breaker).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_single_probe_while_half_open() {
        let breaker = CircuitBreaker::with_thresholds("t4", 1, Duration::from_millis(10), 2);
        let _ = fail(&breaker).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        // First acquire transitions to half-open and takes the probe slot.
        breaker.try_acquire().unwrap();
        // A second concurrent call must fail fast.
        assert!(breaker.try_acquire().is_err());
        breaker.record_success();
        // Probe slot released, next call allowed.
        breaker.try_acquire().unwrap();
    }

    #[tokio::test]
    async fn test_success_resets_closed_failures() {
        let breaker = CircuitBreaker::with_thresholds("t5", 3, Duration::from_secs(30), 2);
        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;
        breaker.call(|| async { Ok::<_, EngineError>(()) }).await.unwrap();
        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
