// crates/soar-core/src/error.rs
// ============================================================================
// Module: Error Taxonomy
// Description: Closed error code sets and the top-level engine error enum.
// Purpose: Give every failure path a stable machine-readable code (§7).
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Three closed code sets cover the spec's error taxonomy: ingress errors
//! (never trigger an execution), connector errors (retryable subset feeds the
//! retry policy), and engine invariants (fatal to the execution). A fourth,
//! `StoreError`, is the ambient persistence-failure channel. [`EngineError`]
//! is the top-level type returned by `soar-core`'s public entry points; the
//! HTTP boundary in `soar-api` maps each variant to a status code exactly
//! once.

use thiserror::Error;

use crate::identifiers::ApprovalId;
use crate::identifiers::ExecutionId;
use crate::identifiers::StepId;

/// Closed set of ingress rejection codes (§4.1, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngressErrorCode {
    /// A timestamp header was present but outside the freshness window.
    TimestampSkew,
    /// A timestamp header was present but too old to accept.
    TimestampExpired,
    /// A signature header was present without an accompanying timestamp.
    MissingTimestamp,
    /// The `(webhook_id, timestamp, body)` nonce was already seen.
    DuplicateNonce,
    /// The request body did not parse as a JSON object.
    InvalidPayload,
    /// The per-IP rate limit was exceeded.
    RateLimited,
    /// The per-playbook flood cap was exceeded.
    PlaybookFloodLimit,
    /// The global flood cap was exceeded.
    GlobalFloodLimit,
    /// The webhook is not `active`/`enabled`.
    WebhookDisabled,
    /// The HMAC signature did not match.
    SignatureMismatch,
}

impl IngressErrorCode {
    /// Returns the stable machine-readable code string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TimestampSkew => "TIMESTAMP_SKEW",
            Self::TimestampExpired => "TIMESTAMP_EXPIRED",
            Self::MissingTimestamp => "MISSING_TIMESTAMP",
            Self::DuplicateNonce => "DUPLICATE_NONCE",
            Self::InvalidPayload => "INVALID_PAYLOAD",
            Self::RateLimited => "RATE_LIMITED",
            Self::PlaybookFloodLimit => "PLAYBOOK_FLOOD_LIMIT",
            Self::GlobalFloodLimit => "GLOBAL_FLOOD_LIMIT",
            Self::WebhookDisabled => "WEBHOOK_DISABLED",
            Self::SignatureMismatch => "SIGNATURE_MISMATCH",
        }
    }
}

/// Closed set of engine invariant violations (§7). Fatal to the execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorCode {
    /// `execution_count` exceeded `MAX_STEP_EXECUTIONS`.
    LoopDetected,
    /// The resolved next step id has no matching step in the playbook.
    StepNotFound,
    /// A condition step completed without selecting a branch.
    ConditionMissingBranch,
    /// An approval step was resumed but the playbook declared no `on_timeout`.
    ApprovalMissingOnTimeout,
    /// A state transition outside the machine in §4.6 was attempted.
    InvalidStateTransition,
    /// A resume call targeted an approval that is no longer pending.
    ApprovalNotPending,
    /// `on_rejected` resolved to a terminal failure.
    ApprovalRejected,
    /// The approval's `expires_at` passed before a decision was made.
    ApprovalTimeout,
    /// An action or enrichment step failed with no (or a `fail`/`stop`-sentinel) `on_failure` branch.
    StepFailed,
}

impl EngineErrorCode {
    /// Returns the stable machine-readable code string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LoopDetected => "LOOP_DETECTED",
            Self::StepNotFound => "STEP_NOT_FOUND",
            Self::ConditionMissingBranch => "CONDITION_MISSING_BRANCH",
            Self::ApprovalMissingOnTimeout => "APPROVAL_MISSING_ON_TIMEOUT",
            Self::InvalidStateTransition => "INVALID_STATE_TRANSITION",
            Self::ApprovalNotPending => "APPROVAL_NOT_PENDING",
            Self::ApprovalRejected => "APPROVAL_REJECTED",
            Self::ApprovalTimeout => "APPROVAL_TIMEOUT",
            Self::StepFailed => "STEP_FAILED",
        }
    }
}

/// Top-level engine error, returned by every `soar-core` public entry point.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Ingress rejected the request before an execution was created.
    #[error("ingress rejected request: {0}")]
    Ingress(IngressErrorCode),

    /// An engine invariant was violated while advancing an execution.
    #[error("engine invariant violated for execution {execution}: {code}")]
    Invariant {
        /// Execution in which the invariant was violated.
        execution: ExecutionId,
        /// Violated invariant code.
        code: EngineErrorCode,
    },

    /// The referenced execution does not exist.
    #[error("execution not found: {0}")]
    ExecutionNotFound(ExecutionId),

    /// The referenced approval does not exist.
    #[error("approval not found: {0}")]
    ApprovalNotFound(ApprovalId),

    /// The referenced step does not exist in the bound playbook version.
    #[error("step not found: {0}")]
    StepNotFound(StepId),

    /// Playbook validation failed; see the attached issues.
    #[error("playbook validation failed with {} issue(s)", .0.len())]
    Validation(Vec<crate::validator::ValidationIssue>),

    /// A connector invocation failed; see the normalized connector error.
    #[error("connector invocation failed: {0}")]
    Connector(#[from] crate::connector::ConnectorError),

    /// The entity store returned a failure.
    #[error("entity store error: {0}")]
    Store(String),
}

impl std::fmt::Display for IngressErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for EngineErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
