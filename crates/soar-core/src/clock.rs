// crates/soar-core/src/clock.rs
// ============================================================================
// Module: Clock
// Description: Injectable time source for freshness windows, SLA math, and backoff.
// Purpose: Keep all wall-clock-dependent decisions testable and deterministic.
// Dependencies: time
// ============================================================================

//! ## Overview
//! The engine never reads wall-clock time directly; every timestamp-dependent
//! decision (webhook freshness, SLA breach computation, retry backoff, approval
//! expiry) goes through an injected [`Clock`]. Production code uses
//! [`SystemClock`]; tests use [`FixedClock`] to make time-dependent scenarios
//! reproducible.

use std::sync::Mutex;

use time::OffsetDateTime;

/// A source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> OffsetDateTime;
}

/// Wall-clock time source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A clock that always returns the same instant unless advanced.
///
/// Useful for scenario tests (S3, S4) that need deterministic timeout and
/// backoff behavior without real sleeps.
#[derive(Debug)]
pub struct FixedClock {
    current: Mutex<OffsetDateTime>,
}

impl FixedClock {
    /// Creates a fixed clock starting at `start`.
    #[must_use]
    pub fn new(start: OffsetDateTime) -> Self {
        Self { current: Mutex::new(start) }
    }

    /// Advances the clock by `duration`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned by a prior panic in another
    /// thread; this is a test-only helper and such poisoning indicates a bug
    /// in the test itself.
    pub fn advance(&self, duration: time::Duration) {
        #[allow(clippy::unwrap_used, reason = "test-only helper, poisoning indicates a prior test bug")]
        let mut guard = self.current.lock().unwrap();
        *guard += duration;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        #[allow(clippy::unwrap_used, reason = "test-only helper, poisoning indicates a prior test bug")]
        let guard = self.current.lock().unwrap();
        *guard
    }
}
