//! Reliability Kit
//!
//! Cross-cutting primitives every external-service call depends on:
//! retry with jittered backoff, per-dependency circuit breakers, the
//! background task manager, per-principal rate limiting, and request-ID
//! propagation.

pub mod breaker;
pub mod rate_limiter;
pub mod request_id;
pub mod retry;
pub mod tasks;

pub use breaker::{CircuitBreaker, CircuitState, BLOCKCHAIN_BREAKER, LLM_BREAKER, MESSAGING_BREAKER, PAYMENTS_BREAKER};
pub use rate_limiter::{RateDecision, RateLimiter};
pub use request_id::RequestId;
pub use retry::{retry_with_backoff, RetryPolicy};
pub use tasks::BackgroundTaskManager;
