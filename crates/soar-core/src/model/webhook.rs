// crates/soar-core/src/model/webhook.rs
// ============================================================================
// Module: Webhook Record
// Description: Webhook ingress endpoint configuration and rolling stats (§3.4).
// Purpose: Model the record the ingress layer reads on every inbound request.
// Dependencies: serde
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::identifiers::WebhookId;

/// Lifecycle status of a webhook endpoint (§3.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookStatus {
    /// Accepting requests normally.
    Active,
    /// Temporarily rejecting requests with `WEBHOOK_DISABLED` (operator action).
    Suspended,
    /// Permanently rejecting requests with `WEBHOOK_DISABLED`.
    Disabled,
}

/// Per-webhook rate limiting configuration (§4.1).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests per minute allowed from a single source IP.
    pub per_ip_per_minute: u32,
    /// Executions per minute allowed for the bound playbook.
    pub playbook_floods_per_minute: u32,
}

/// A webhook ingress endpoint (§3.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Webhook {
    /// Webhook identifier, embedded in the ingress URL path.
    pub webhook_id: WebhookId,
    /// Current lifecycle status.
    pub status: WebhookStatus,
    /// HMAC-SHA256 shared secret used to verify the signature header.
    pub secret: String,
    /// Resolved per Open Question 1: when `true`, a missing or mismatched
    /// signature is rejected; when `false`, the signature header is verified
    /// only if present.
    pub require_hmac: bool,
    /// Accepted clock skew, in seconds, for the timestamp header (§4.1).
    pub timestamp_tolerance_seconds: i64,
    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,
    /// Rolling request/acceptance counters, maintained by the ingress layer.
    #[serde(default)]
    pub stats: WebhookStats,
}

/// Rolling acceptance counters for a webhook (§4.7 observability).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WebhookStats {
    /// Total requests received.
    pub received_total: u64,
    /// Requests accepted and dispatched to the engine.
    pub accepted_total: u64,
    /// Requests rejected, for any ingress reason.
    pub rejected_total: u64,
}
