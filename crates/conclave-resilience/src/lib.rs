//! Resilience primitives shared by the LLM driver and the gateway: a circuit
//! breaker, retry-with-backoff, and a per-key rate limiter. Each is
//! independently constructible and testable — nothing here knows about
//! sessions, agents, or the wire protocol.

pub mod circuit_breaker;
pub mod rate_limiter;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitError, State as CircuitState};
pub use rate_limiter::{RateLimiter, RateLimiterConfig};
pub use retry::{retry_with_backoff, RetryConfig, Retryable};
