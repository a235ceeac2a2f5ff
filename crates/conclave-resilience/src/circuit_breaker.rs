//! Circuit breaker guarding the LLM client (spec §4.5).
//!
//! CLOSED -> OPEN after `failure_threshold` consecutive failures.
//! OPEN -> HALF_OPEN once `recovery_timeout` has elapsed since the trip.
//! HALF_OPEN -> CLOSED on the next success, or back to OPEN on the next failure.
//! While OPEN (and not yet due for a trial), calls fail fast without running
//! the guarded operation.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: State,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// A single breaker instance, intended to be shared (one per upstream/provider).
#[derive(Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitError<E> {
    #[error("circuit breaker is open")]
    Open,
    #[error(transparent)]
    Inner(E),
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Arc::new(Mutex::new(Inner {
                state: State::Closed,
                consecutive_failures: 0,
                opened_at: None,
            })),
        }
    }

    pub async fn state(&self) -> State {
        self.inner.lock().await.state
    }

    /// Run `operation` through the breaker. Fails fast with `CircuitError::Open`
    /// if the breaker is OPEN and not yet due for a half-open trial.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        {
            let mut guard = self.inner.lock().await;
            match guard.state {
                State::Open => {
                    let due = guard
                        .opened_at
                        .map(|at| at.elapsed() >= self.config.recovery_timeout)
                        .unwrap_or(true);
                    if due {
                        guard.state = State::HalfOpen;
                        tracing::info!("circuit breaker transitioning to half-open");
                    } else {
                        return Err(CircuitError::Open);
                    }
                }
                State::Closed | State::HalfOpen => {}
            }
        }

        match operation().await {
            Ok(value) => {
                self.on_success().await;
                Ok(value)
            }
            Err(err) => {
                self.on_failure().await;
                Err(CircuitError::Inner(err))
            }
        }
    }

    async fn on_success(&self) {
        let mut guard = self.inner.lock().await;
        if guard.state != State::Closed {
            tracing::info!("circuit breaker closed after successful trial");
        }
        guard.state = State::Closed;
        guard.consecutive_failures = 0;
        guard.opened_at = None;
    }

    async fn on_failure(&self) {
        let mut guard = self.inner.lock().await;
        match guard.state {
            State::HalfOpen => {
                guard.state = State::Open;
                guard.opened_at = Some(Instant::now());
                tracing::warn!("circuit breaker re-opened after failed trial");
            }
            State::Closed => {
                guard.consecutive_failures += 1;
                if guard.consecutive_failures >= self.config.failure_threshold {
                    guard.state = State::Open;
                    guard.opened_at = Some(Instant::now());
                    tracing::warn!(
                        failures = guard.consecutive_failures,
                        "circuit breaker opened"
                    );
                }
            }
            State::Open => {
                guard.opened_at = Some(Instant::now());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stays_closed_below_threshold() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 3,
            recovery_timeout: Duration::from_millis(50),
        });
        for _ in 0..2 {
            let _ = cb.call(|| async { Err::<(), _>("boom") }).await;
        }
        assert_eq!(cb.state().await, State::Closed);
    }

    #[tokio::test]
    async fn opens_after_threshold_and_fails_fast() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 2,
            recovery_timeout: Duration::from_secs(60),
        });
        for _ in 0..2 {
            let _ = cb.call(|| async { Err::<(), _>("boom") }).await;
        }
        assert_eq!(cb.state().await, State::Open);

        let result = cb.call(|| async { Ok::<_, &str>(1) }).await;
        assert!(matches!(result, Err(CircuitError::Open)));
    }

    #[tokio::test]
    async fn half_opens_after_recovery_timeout_and_closes_on_success() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_millis(10),
        });
        let _ = cb.call(|| async { Err::<(), _>("boom") }).await;
        assert_eq!(cb.state().await, State::Open);

        tokio::time::sleep(Duration::from_millis(20)).await;

        let result = cb.call(|| async { Ok::<_, &str>(99) }).await;
        assert_eq!(result.unwrap(), 99);
        assert_eq!(cb.state().await, State::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens_circuit() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_millis(10),
        });
        let _ = cb.call(|| async { Err::<(), _>("boom") }).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let result = cb.call(|| async { Err::<(), _>("boom again") }).await;
        assert!(matches!(result, Err(CircuitError::Inner(_))));
        assert_eq!(cb.state().await, State::Open);
    }
}
