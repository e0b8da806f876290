// crates/soar-api/src/rate_limit.rs
// ============================================================================
// Module: Ingress Rate Limiting
// Description: Fixed-window per-key request caps for webhook ingress (§4.1).
// Purpose: Bound per-IP and per-playbook request rates without a shared cache.
// Dependencies: std::sync, std::time
// ============================================================================

//! ## Overview
//! One [`RateLimiter`] instance tracks two independent key spaces: source IP
//! (check 1) and playbook id (check 7, the "flood" cap). Each key gets a
//! fixed one-minute window; a bucket resets once the window elapses rather
//! than sliding, trading precision for a single `HashMap` lookup per request.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

const WINDOW: Duration = Duration::from_secs(60);
const BUCKET_TTL: Duration = Duration::from_secs(120);
/// Upper bound on distinct tracked keys, to cap memory under a wide IP spray.
const MAX_TRACKED_KEYS: usize = 65_536;

struct Bucket {
    window_start: Instant,
    count: u32,
    last_seen: Instant,
}

/// Outcome of a rate limit check.
pub enum Decision {
    /// The request may proceed.
    Allow,
    /// The request must be rejected; retry after this many seconds.
    Limited {
        /// Seconds until the current window closes.
        retry_after_secs: u64,
    },
}

/// A fixed-window limiter over two independent key spaces.
pub struct RateLimiter {
    per_ip: Mutex<HashMap<String, Bucket>>,
    per_playbook: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    /// Creates an empty limiter.
    #[must_use]
    pub fn new() -> Self {
        Self { per_ip: Mutex::new(HashMap::new()), per_playbook: Mutex::new(HashMap::new()) }
    }

    /// Checks and records a request from `ip` against `per_ip_per_minute`.
    pub fn check_ip(&self, ip: &str, per_ip_per_minute: u32) -> Decision {
        check(&self.per_ip, ip, per_ip_per_minute)
    }

    /// Checks and records a request for `playbook_id` against
    /// `playbook_floods_per_minute`.
    pub fn check_playbook(&self, playbook_id: &str, playbook_floods_per_minute: u32) -> Decision {
        check(&self.per_playbook, playbook_id, playbook_floods_per_minute)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

fn check(buckets: &Mutex<HashMap<String, Bucket>>, key: &str, max_per_window: u32) -> Decision {
    let now = Instant::now();
    #[allow(clippy::unwrap_used, reason = "poisoning here means a prior request panicked mid-check; fail open would defeat the limiter's purpose")]
    let mut guard = buckets.lock().unwrap();
    if guard.len() >= MAX_TRACKED_KEYS {
        guard.retain(|_, bucket| now.duration_since(bucket.last_seen) <= BUCKET_TTL);
    }
    let bucket = guard.entry(key.to_string()).or_insert_with(|| Bucket { window_start: now, count: 0, last_seen: now });
    if now.duration_since(bucket.window_start) >= WINDOW {
        bucket.window_start = now;
        bucket.count = 0;
    }
    bucket.last_seen = now;
    if bucket.count >= max_per_window {
        let elapsed = now.duration_since(bucket.window_start);
        let retry_after_secs = WINDOW.saturating_sub(elapsed).as_secs().max(1);
        Decision::Limited { retry_after_secs }
    } else {
        bucket.count += 1;
        Decision::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_limit_then_rejects() {
        let limiter = RateLimiter::new();
        for _ in 0..5 {
            assert!(matches!(limiter.check_ip("1.2.3.4", 5), Decision::Allow));
        }
        assert!(matches!(limiter.check_ip("1.2.3.4", 5), Decision::Limited { .. }));
    }

    #[test]
    fn independent_keys_do_not_interfere() {
        let limiter = RateLimiter::new();
        assert!(matches!(limiter.check_ip("1.2.3.4", 1), Decision::Allow));
        assert!(matches!(limiter.check_ip("5.6.7.8", 1), Decision::Allow));
    }
}
