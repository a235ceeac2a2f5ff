//! Per-key token-bucket rate limiter (spec §5: default 60 requests/minute per client).

use dashmap::DashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window: Duration::from_secs(60),
        }
    }
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Tracks one token bucket per key (typically a client IP or API key).
/// Buckets refill continuously at `max_requests / window`.
pub struct RateLimiter {
    config: RateLimiterConfig,
    buckets: DashMap<String, Bucket>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            buckets: DashMap::new(),
        }
    }

    fn refill_rate_per_sec(&self) -> f64 {
        self.config.max_requests as f64 / self.config.window.as_secs_f64()
    }

    /// Attempt to consume one token for `key`. Returns `true` if allowed.
    pub fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let rate = self.refill_rate_per_sec();
        let capacity = self.config.max_requests as f64;

        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket {
                tokens: capacity,
                last_refill: now,
            });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * rate).min(capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Drop buckets untouched for longer than `idle_after` to bound memory growth.
    pub fn sweep_idle(&self, idle_after: Duration) {
        let now = Instant::now();
        self.buckets
            .retain(|_, bucket| now.duration_since(bucket.last_refill) < idle_after);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_requests_up_to_capacity() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            max_requests: 3,
            window: Duration::from_secs(60),
        });
        assert!(limiter.check("client-a"));
        assert!(limiter.check("client-a"));
        assert!(limiter.check("client-a"));
        assert!(!limiter.check("client-a"));
    }

    #[test]
    fn tracks_keys_independently() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            max_requests: 1,
            window: Duration::from_secs(60),
        });
        assert!(limiter.check("a"));
        assert!(!limiter.check("a"));
        assert!(limiter.check("b"));
    }

    #[test]
    fn sweep_idle_removes_stale_buckets() {
        let limiter = RateLimiter::new(RateLimiterConfig::default());
        limiter.check("stale");
        limiter.sweep_idle(Duration::from_secs(0));
        assert_eq!(limiter.buckets.len(), 0);
    }
}
