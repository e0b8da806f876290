// crates/soar-api/src/nonce_cache.rs
// ============================================================================
// Module: Replay Protection
// Description: Bounded, time-expiring cache of recently-seen webhook nonces.
// Purpose: Reject a signed request whose (webhook, timestamp, body) was
//          already accepted inside the freshness window (§4.1 check 4).
// Dependencies: soar-core, std::collections, std::time
// ============================================================================

//! A "nonce" here is not a field on the request; it is derived from the
//! webhook id, the claimed timestamp, and a digest of the body, so a replayed
//! request (same bytes, same signature) collides with its own prior entry
//! even though the protocol never sends an explicit nonce.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::time::Duration;
use std::time::Instant;

/// Tracks seen nonces with FIFO eviction once `capacity` is exceeded, and
/// age-based eviction once an entry outlives the freshness window.
pub struct NonceCache {
    capacity: usize,
    ttl: Duration,
    seen: HashMap<String, Instant>,
    order: VecDeque<String>,
}

impl NonceCache {
    /// Creates a cache holding at most `capacity` entries, each valid for
    /// `ttl` (normally the ingress timestamp tolerance, doubled).
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self { capacity: capacity.max(1), ttl, seen: HashMap::new(), order: VecDeque::new() }
    }

    /// Records `nonce` if unseen. Returns `true` if this is the first time
    /// the nonce was observed (the caller should proceed); `false` means a
    /// replay.
    pub fn observe(&mut self, nonce: String) -> bool {
        let now = Instant::now();
        self.evict_expired(now);
        if self.seen.contains_key(&nonce) {
            return false;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.seen.insert(nonce.clone(), now);
        self.order.push_back(nonce);
        true
    }

    fn evict_expired(&mut self, now: Instant) {
        while let Some(front) = self.order.front() {
            let Some(&inserted_at) = self.seen.get(front) else {
                self.order.pop_front();
                continue;
            };
            if now.duration_since(inserted_at) <= self.ttl {
                break;
            }
            if let Some(front) = self.order.pop_front() {
                self.seen.remove(&front);
            }
        }
    }
}

/// Derives a nonce from the webhook id, the claimed unix timestamp, and a
/// SHA-256 digest of the raw request body, so a byte-identical replay always
/// collides with its own prior entry.
#[must_use]
pub fn derive_nonce(webhook_id: &str, timestamp: i64, body: &[u8]) -> String {
    soar_core::hashing::webhook_nonce(webhook_id, timestamp, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_passes_repeat_is_rejected() {
        let mut cache = NonceCache::new(16, Duration::from_secs(600));
        let nonce = derive_nonce("wh-1", 1_700_000_000, b"{}");
        assert!(cache.observe(nonce.clone()));
        assert!(!cache.observe(nonce));
    }

    #[test]
    fn capacity_evicts_oldest_first() {
        let mut cache = NonceCache::new(2, Duration::from_secs(600));
        assert!(cache.observe("1".to_string()));
        assert!(cache.observe("2".to_string()));
        assert!(cache.observe("3".to_string()));
        assert!(cache.observe("1".to_string()));
    }

    #[test]
    fn distinct_inputs_derive_distinct_nonces() {
        let a = derive_nonce("wh-1", 1_700_000_000, b"{}");
        let b = derive_nonce("wh-1", 1_700_000_001, b"{}");
        let c = derive_nonce("wh-2", 1_700_000_000, b"{}");
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
