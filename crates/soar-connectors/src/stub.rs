// crates/soar-connectors/src/stub.rs
// ============================================================================
// Module: Stub Connector
// Description: A deterministic in-memory connector for tests and shadow demos.
// Purpose: Exercise the engine's dispatch/retry paths without real network I/O.
// Dependencies: soar-core
// ============================================================================

//! ## Overview
//! [`StubConnector`] always returns a canned response, or a canned error for a
//! configurable number of leading attempts before succeeding, to exercise the
//! engine's bounded retry path deterministically.

use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::Value;
use soar_core::connector::ActionSchema;
use soar_core::connector::Connector;
use soar_core::connector::ConnectorError;

/// A connector that echoes its inputs, optionally failing the first N calls.
pub struct StubConnector {
    fail_first_n: u32,
    attempts: AtomicU32,
}

impl StubConnector {
    /// Creates a stub connector that always succeeds.
    #[must_use]
    pub const fn new() -> Self {
        Self { fail_first_n: 0, attempts: AtomicU32::new(0) }
    }

    /// Creates a stub connector that fails its first `fail_first_n` calls
    /// with a retryable error, then succeeds.
    #[must_use]
    pub const fn failing_first(fail_first_n: u32) -> Self {
        Self { fail_first_n, attempts: AtomicU32::new(0) }
    }
}

impl Default for StubConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for StubConnector {
    fn schema(&self, _action_type: &str) -> Option<ActionSchema> {
        None
    }

    fn execute(&self, _action_type: &str, inputs: &Value, _timeout: Duration) -> Result<Value, ConnectorError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.fail_first_n {
            return Err(ConnectorError::ServiceUnavailable("stub: simulated transient failure".to_string()));
        }
        Ok(inputs.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn succeeds_after_configured_failures() {
        let connector = StubConnector::failing_first(2);
        assert!(connector.execute("x", &serde_json::json!({}), Duration::from_secs(1)).is_err());
        assert!(connector.execute("x", &serde_json::json!({}), Duration::from_secs(1)).is_err());
        assert!(connector.execute("x", &serde_json::json!({}), Duration::from_secs(1)).is_ok());
    }
}
