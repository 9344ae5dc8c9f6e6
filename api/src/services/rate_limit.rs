//! Per-user rate limiting for detection save/query endpoints
//!
//! Token bucket per user id, held in memory. Tokens refill over time.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Rate limiter configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitConfig {
    /// Maximum tokens (burst capacity)
    pub max_tokens: u32,
    /// Tokens added per second
    pub refill_rate: f64,
}

impl Default for RateLimitConfig {
    /// Burst of 60, sustained 2 requests/second
    fn default() -> Self {
        Self {
            max_tokens: 60,
            refill_rate: 2.0,
        }
    }
}

struct UserBucket {
    tokens: f64,
    last_update: Instant,
}

pub struct UserRateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<String, UserBucket>>,
}

impl UserRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Consume one token for `user_id`. Returns false when rate limited.
    pub fn check(&self, user_id: &str) -> bool {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let max = f64::from(self.config.max_tokens);

        let bucket = buckets
            .entry(user_id.to_string())
            .or_insert_with(|| UserBucket {
                tokens: max,
                last_update: now,
            });

        let elapsed = now.duration_since(bucket.last_update);
        bucket.tokens = (bucket.tokens + elapsed.as_secs_f64() * self.config.refill_rate).min(max);
        bucket.last_update = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Drop buckets idle for longer than `max_age`
    pub fn cleanup(&self, max_age: Duration) {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        buckets.retain(|_, bucket| now.duration_since(bucket.last_update) < max_age);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_then_limited_per_user() {
        let limiter = UserRateLimiter::new(RateLimitConfig {
            max_tokens: 3,
            refill_rate: 0.0,
        });

        assert!(limiter.check("alice"));
        assert!(limiter.check("alice"));
        assert!(limiter.check("alice"));
        assert!(!limiter.check("alice"));
        // Other users have their own bucket
        assert!(limiter.check("bob"));
    }

    #[test]
    fn cleanup_drops_idle_buckets() {
        let limiter = UserRateLimiter::new(RateLimitConfig::default());
        limiter.check("alice");
        assert_eq!(limiter.buckets.lock().unwrap().len(), 1);
        limiter.cleanup(Duration::ZERO);
        assert!(limiter.buckets.lock().unwrap().is_empty());
    }
}
