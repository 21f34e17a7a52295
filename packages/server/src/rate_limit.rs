//! Fixed-window rate-limit counters.
//!
//! Three independent buckets: per-IP general, per-IP auth, per-authenticated
//! user. Each is a `(key, window_start) -> count` map behind a
//! `std::sync::Mutex`, matching the in-memory state-map idiom used
//! throughout the persistence and queue crates. This in-memory limiter
//! can't fail to connect, so there's no fail-open-on-backend-unavailable
//! path to trigger here; a `cache_url`-backed limiter would need one.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// One fixed-window counter keyed by caller identity.
struct Window {
    count: u32,
    started: Instant,
}

/// A single rate-limit bucket: `limit` requests per `window`.
pub struct FixedWindowLimiter {
    limit: u32,
    window: Duration,
    counters: Mutex<HashMap<String, Window>>,
}

impl FixedWindowLimiter {
    /// Creates a limiter allowing `limit` requests per `window`.
    #[must_use]
    pub fn new(limit: u32, window: Duration) -> Self {
        Self { limit, window, counters: Mutex::new(HashMap::new()) }
    }

    /// Records one request for `key`. Returns `Ok(())` if under the limit,
    /// or `Err(retry_after_secs)` if it would exceed it (the counter is
    /// still incremented so a forced caller doesn't get a free pass).
    pub fn check(&self, key: &str) -> Result<(), u64> {
        let mut counters = self.counters.lock().expect("rate limiter mutex poisoned");
        let now = Instant::now();
        let entry = counters.entry(key.to_string()).or_insert_with(|| Window { count: 0, started: now });

        if now.duration_since(entry.started) >= self.window {
            entry.count = 0;
            entry.started = now;
        }

        entry.count += 1;
        if entry.count > self.limit {
            let retry_after = self.window.saturating_sub(now.duration_since(entry.started)).as_secs().max(1);
            return Err(retry_after);
        }
        Ok(())
    }
}

/// The three rate-limit buckets.
pub struct RateLimiters {
    /// Per-IP, general endpoints. Default 60/min.
    pub per_ip_general: FixedWindowLimiter,
    /// Per-IP, auth endpoints. Default 10/min.
    pub per_ip_auth: FixedWindowLimiter,
    /// Per authenticated user, all endpoints. Default 120/min.
    pub per_user: FixedWindowLimiter,
}

impl Default for RateLimiters {
    fn default() -> Self {
        Self {
            per_ip_general: FixedWindowLimiter::new(60, Duration::from_secs(60)),
            per_ip_auth: FixedWindowLimiter::new(10, Duration::from_secs(60)),
            per_user: FixedWindowLimiter::new(120, Duration::from_secs(60)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_requests_under_the_limit() {
        let limiter = FixedWindowLimiter::new(3, Duration::from_secs(60));
        assert!(limiter.check("a").is_ok());
        assert!(limiter.check("a").is_ok());
        assert!(limiter.check("a").is_ok());
    }

    #[test]
    fn rejects_requests_over_the_limit() {
        let limiter = FixedWindowLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.check("a").is_ok());
        assert!(limiter.check("a").is_ok());
        assert!(limiter.check("a").is_err());
    }

    #[test]
    fn different_keys_have_independent_counters() {
        let limiter = FixedWindowLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check("a").is_ok());
        assert!(limiter.check("b").is_ok());
    }

    #[test]
    fn window_resets_after_expiry() {
        let limiter = FixedWindowLimiter::new(1, Duration::from_millis(20));
        assert!(limiter.check("a").is_ok());
        std::thread::sleep(Duration::from_millis(30));
        assert!(limiter.check("a").is_ok());
    }
}
