// crates/soar-core/src/model/playbook.rs
// ============================================================================
// Module: Playbook Record
// Description: The versioned playbook DSL: steps, branches, and retry policy.
// Purpose: Model §3.1-§3.2 and the step kinds dispatched by the engine.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A [`Playbook`] is an immutable, versioned document. `version` increments on
//! every edit; only one version per `playbook_id` may be `active` at a time
//! (§3.1 single-active-version invariant, enforced by the store, not here).
//! [`PlaybookDsl`] is the parsed step graph a single version carries.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::identifiers::ConnectorId;
use crate::identifiers::PlaybookId;
use crate::identifiers::StepId;
use crate::model::trigger::Trigger;

/// A single version of a playbook (§3.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playbook {
    /// Logical playbook identifier, stable across versions.
    pub playbook_id: PlaybookId,
    /// Monotonically increasing version number.
    pub version: u32,
    /// Whether this version is the one triggers and resumes bind to.
    pub active: bool,
    /// Display name.
    pub name: String,
    /// The parsed step graph.
    pub dsl: PlaybookDsl,
}

/// The step graph a playbook version carries (§3.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybookDsl {
    /// The step executed first.
    pub start_step: StepId,
    /// All steps, keyed by id.
    pub steps: BTreeMap<StepId, Step>,
    /// Whether this playbook runs in shadow (dry-run) mode (§4.4.7).
    #[serde(default)]
    pub shadow_mode: bool,
}

/// A single playbook step (§3.2, §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Step identifier, unique within the playbook version.
    pub step_id: StepId,
    /// The step's behavior and branch targets.
    pub kind: StepKind,
}

/// The behavior and branch wiring of one step (§4.4.1-§4.4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    /// Invokes a read-only connector lookup and records its output; never
    /// subject to shadow mode since it has no side effects to suppress.
    Enrichment {
        /// Connector to invoke, resolved by id, type, or name.
        connector: ConnectorId,
        /// Action type the connector must support.
        action_type: String,
        /// Template/dotted-path inputs resolved before invocation.
        inputs: BTreeMap<String, Value>,
        /// Bounded retry/backoff policy for transient connector failures.
        #[serde(default)]
        retry_policy: RetryPolicy,
        /// Next step on success. `None` ends the execution.
        on_success: Option<StepId>,
        /// Next step on non-retryable or exhausted-retry failure.
        on_failure: Option<StepId>,
    },
    /// Evaluates an ordered condition list and branches on the boolean result.
    Condition {
        /// The condition list and match mode.
        trigger: Trigger,
        /// Next step when the conditions match.
        on_true: Option<StepId>,
        /// Next step when the conditions do not match.
        on_false: Option<StepId>,
    },
    /// Suspends the execution pending a human decision.
    Approval {
        /// Seconds from suspension until the approval expires.
        timeout_seconds: u64,
        /// Next step when approved.
        on_approved: Option<StepId>,
        /// Next step when rejected. Canonical spelling is `"fail"`; `"stop"`
        /// is accepted as a synonym and normalized at validation time.
        on_rejected: Option<StepId>,
        /// Next step when the approval times out without a decision.
        on_timeout: Option<StepId>,
    },
    /// Invokes a connector action.
    Action {
        /// Connector to invoke, resolved by id, type, or name.
        connector: ConnectorId,
        /// Action type the connector must support.
        action_type: String,
        /// Template/dotted-path inputs resolved before invocation.
        inputs: BTreeMap<String, Value>,
        /// Bounded retry/backoff policy for transient connector failures.
        #[serde(default)]
        retry_policy: RetryPolicy,
        /// Next step on success.
        on_success: Option<StepId>,
        /// Next step on non-retryable or exhausted-retry failure.
        on_failure: Option<StepId>,
    },
    /// Sends a notification. Suppressed entirely in shadow mode.
    Notification {
        /// Connector to invoke for delivery.
        connector: ConnectorId,
        /// Template/dotted-path inputs resolved before delivery.
        inputs: BTreeMap<String, Value>,
        /// Next step, unconditionally.
        on_success: Option<StepId>,
    },
}

impl StepKind {
    /// Returns a short tag identifying the step kind, for audit/log output.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Enrichment { .. } => "enrichment",
            Self::Condition { .. } => "condition",
            Self::Approval { .. } => "approval",
            Self::Action { .. } => "action",
            Self::Notification { .. } => "notification",
        }
    }
}

/// Bounded retry policy for action steps (§4.4.4).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum retry attempts after the first try.
    pub max_attempts: u32,
    /// Base backoff in milliseconds.
    pub base_backoff_ms: u64,
    /// Backoff multiplier applied per retry.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 0, base_backoff_ms: 0, backoff_multiplier: 1.0 }
    }
}

impl RetryPolicy {
    /// Computes the backoff duration before attempt `attempt` (1-indexed retry count).
    #[must_use]
    pub fn backoff_for_attempt(&self, attempt: u32) -> std::time::Duration {
        let factor = self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            reason = "backoff is bounded by max_attempts and never needs sub-millisecond precision"
        )]
        let millis = (self.base_backoff_ms as f64 * factor).round() as u64;
        std::time::Duration::from_millis(millis)
    }
}
