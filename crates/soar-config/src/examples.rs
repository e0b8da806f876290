// crates/soar-config/src/examples.rs
// ============================================================================
// Module: Config Example
// Description: A fully-commented example soar.toml for operators.
// Purpose: Ship a starting point next to the binary, per `soar-cli config init`.
// Dependencies: none
// ============================================================================

/// Returns an annotated example `soar.toml`, matching [`crate::SoarConfig`]'s
/// default values.
#[must_use]
pub fn config_toml_example() -> &'static str {
    r#"# soar.toml — layered startup configuration.
# Every value here may also be set via an environment variable (see DESIGN.md);
# environment variables take precedence over this file.

[engine]
# Loop guard: an execution that advances this many steps is failed with
# LOOP_DETECTED rather than pinning a worker thread forever.
max_step_executions = 1000
# Upper bound on a single connector invocation, in seconds.
max_step_timeout_seconds = 30

[ingress]
# Tolerance for clock skew on signed webhook requests, in seconds.
timestamp_tolerance_seconds = 300
# Maximum accepted webhook request body size, in bytes.
max_body_bytes = 1048576
# Number of recent nonces retained per webhook for replay detection.
nonce_cache_capacity = 65536

[ingress.rate_limit]
# Default per-source-IP cap, overridable per webhook record.
per_ip_per_minute = 60
# Default cap across all sources for one playbook, the "flood" limit.
playbook_floods_per_minute = 120

[sla]
# Default SLA thresholds, in milliseconds, used when no playbook- or
# severity-scoped policy matches. Must be non-decreasing.
acknowledge_ms = 300000
containment_ms = 1800000
resolution_ms = 14400000
"#
}
