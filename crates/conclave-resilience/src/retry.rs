//! Retry with exponential backoff (spec §4.5: N=3, start 2s, cap 10s)

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Whether an error should be retried at all — distinguishes transient
/// failures (429/503/504/connection reset/read timeout) from permanent
/// ones (spec §4.5).
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let exp = base_ms * self.backoff_multiplier.powi(attempt as i32);
        let capped = exp.min(self.max_delay.as_millis() as f64);
        let jitter_range = capped * self.jitter_factor;
        let jitter = rand::random::<f64>() * jitter_range - jitter_range / 2.0;
        Duration::from_millis((capped + jitter).max(0.0) as u64)
    }
}

/// Retry `operation` up to `config.max_attempts` times, stopping early on a
/// non-retryable error. Returns the last error if every attempt is exhausted.
pub async fn retry_with_backoff<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable,
{
    let mut last_error = None;

    for attempt in 0..config.max_attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_retryable() {
                    return Err(err);
                }
                last_error = Some(err);
                if attempt + 1 < config.max_attempts {
                    let delay = config.delay_for_attempt(attempt);
                    tracing::debug!(attempt, ?delay, "retrying after transient failure");
                    sleep(delay).await;
                }
            }
        }
    }

    Err(last_error.expect("loop always runs at least once"))
}
