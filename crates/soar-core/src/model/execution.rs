// crates/soar-core/src/model/execution.rs
// ============================================================================
// Module: Execution Record
// Description: A single playbook run: state, step history, and SLA status.
// Purpose: Model §3.5 and the state machine the engine enforces (§4.6).
// Dependencies: serde, serde_json, time
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;

use crate::identifiers::ExecutionId;
use crate::identifiers::PlaybookId;
use crate::identifiers::StepId;
use crate::identifiers::TriggerId;

/// The execution-level state machine (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Created, not yet dispatched to a worker.
    Pending,
    /// Actively advancing through steps.
    Running,
    /// Suspended at an `Approval` step awaiting a decision.
    AwaitingApproval,
    /// Reached a step with no outgoing branch; terminal success.
    Completed,
    /// An action step exhausted retries or a condition had no branch; terminal failure.
    Failed,
    /// An approval was rejected or timed out without an `on_rejected`/`on_timeout` branch; terminal failure.
    Rejected,
}

impl ExecutionState {
    /// Whether this state has no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Rejected)
    }
}

/// A single playbook run (§3.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    /// Execution identifier, time-ordered.
    pub execution_id: ExecutionId,
    /// Playbook this execution is bound to.
    pub playbook_id: PlaybookId,
    /// Playbook version this execution is bound to, fixed at creation (§3.1).
    pub playbook_version: u32,
    /// Trigger that started this execution, if started by ingress.
    pub trigger_id: Option<TriggerId>,
    /// Current state.
    pub state: ExecutionState,
    /// Step currently executing or suspended at.
    pub current_step: Option<StepId>,
    /// Number of step advances so far, for loop detection (§4.4.3).
    pub step_execution_count: u32,
    /// The normalized alert context steps resolve inputs from.
    pub context: Value,
    /// Per-step execution history.
    pub history: Vec<StepRecord>,
    /// Whether this execution ran in shadow (dry-run) mode.
    pub shadow_mode: bool,
    /// Creation time.
    pub created_at: OffsetDateTime,
    /// Last state transition time.
    pub updated_at: OffsetDateTime,
    /// When the triggering webhook was received, if this execution started
    /// from ingress (used as the SLA acknowledge boundary's start instant).
    pub webhook_received_at: Option<OffsetDateTime>,
    /// When the engine first began advancing this execution (the SLA
    /// acknowledge boundary's end instant).
    pub acknowledged_at: Option<OffsetDateTime>,
    /// When the first action step completed, successfully or not (the SLA
    /// containment boundary).
    pub containment_at: Option<OffsetDateTime>,
    /// When this execution reached a terminal state (the SLA resolution
    /// boundary).
    pub completed_at: Option<OffsetDateTime>,
    /// Wall-clock duration from `created_at` to `completed_at`, once terminal.
    pub duration_ms: Option<u64>,
    /// SLA tracking for this execution, if a policy applies.
    pub sla: Option<SlaStatus>,
}

/// One step's execution record (§3.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// Step identifier.
    pub step_id: StepId,
    /// Outcome of this step attempt.
    pub state: StepState,
    /// Resolved inputs, recorded for audit even in shadow mode.
    pub resolved_inputs: BTreeMap<String, Value>,
    /// Connector/engine output, when applicable.
    pub output: Option<Value>,
    /// Attempt number within this step's retry policy.
    pub attempt: u32,
    /// Start time.
    pub started_at: OffsetDateTime,
    /// Completion time, if finished.
    pub finished_at: Option<OffsetDateTime>,
}

/// Outcome of one step attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    /// Currently executing.
    Running,
    /// Completed without error.
    Succeeded,
    /// Failed; may still retry depending on policy.
    Failed,
    /// Suppressed because the playbook runs in shadow mode.
    Skipped,
}

/// One SLA dimension's threshold, observed actual, and breach status (§4.7).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SlaDimension {
    /// Maximum time budget for this dimension, in milliseconds.
    pub threshold_ms: u64,
    /// Observed elapsed time, in milliseconds, once its boundary is reached.
    pub actual_ms: Option<u64>,
    /// Whether `actual_ms` (once known) exceeds `threshold_ms`.
    pub breached: bool,
}

impl SlaDimension {
    /// Builds a dimension with no observed actual yet (boundary not reached).
    #[must_use]
    pub const fn pending(threshold_ms: u64) -> Self {
        Self { threshold_ms, actual_ms: None, breached: false }
    }

    /// Builds a dimension from an observed elapsed time, computing `breached`.
    #[must_use]
    pub const fn observed(threshold_ms: u64, actual_ms: u64) -> Self {
        Self { threshold_ms, actual_ms: Some(actual_ms), breached: actual_ms > threshold_ms }
    }
}

/// Classification of why an execution breached its SLA (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreachReason {
    /// A step failed outright (a non-transient connector or validation error).
    AutomationFailure,
    /// A step failed or stalled on a timeout/connection-class error.
    ExternalDependencyDelay,
    /// The execution suspended at an approval step.
    ManualInterventionDelay,
}

/// SLA tracking attached to an execution (§4.7): three independently-tracked
/// dimensions plus a breach classification once any dimension trips.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaStatus {
    /// Policy identifier applied to this execution.
    pub policy_id: crate::identifiers::SlaPolicyId,
    /// Time from webhook receipt to the engine beginning to advance it.
    pub acknowledge: SlaDimension,
    /// Time from creation to the first completed action step.
    pub containment: SlaDimension,
    /// Time from creation to reaching a terminal state.
    pub resolution: SlaDimension,
    /// Why the execution breached, once any dimension has `breached == true`.
    pub breach_reason: Option<BreachReason>,
}

impl SlaStatus {
    /// Whether any tracked dimension has breached.
    #[must_use]
    pub const fn any_breached(&self) -> bool {
        self.acknowledge.breached || self.containment.breached || self.resolution.breached
    }
}
