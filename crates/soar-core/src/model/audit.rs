// crates/soar-core/src/model/audit.rs
// ============================================================================
// Module: Audit and Metrics Record
// Description: The append-only audit trail and in-process counters (§4.7).
// Purpose: Model every state-changing action for traceability.
// Dependencies: serde, serde_json, time
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;

use crate::identifiers::AuditId;
use crate::identifiers::ExecutionId;

/// The closed set of audited actions (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A webhook request was accepted and an execution created.
    WebhookAccepted,
    /// A webhook request was rejected at ingress.
    WebhookRejected,
    /// A step started executing.
    StepStarted,
    /// A step completed.
    StepCompleted,
    /// A step retried after a transient failure.
    StepRetried,
    /// An approval was created.
    ApprovalCreated,
    /// An approval was decided.
    ApprovalDecided,
    /// An approval timed out.
    ApprovalTimedOut,
    /// An execution reached a terminal state.
    ExecutionTerminated,
    /// An execution's SLA deadline was breached.
    SlaBreached,
    /// A platform health counter crossed its threshold.
    HealthAlert,
}

/// One append-only audit entry (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Audit entry identifier.
    pub audit_id: AuditId,
    /// Execution this entry pertains to, if any.
    pub execution_id: Option<ExecutionId>,
    /// The action recorded.
    pub action: AuditAction,
    /// Free-form structured detail (step id, connector error code, etc.).
    pub detail: Value,
    /// Time the action occurred.
    pub occurred_at: OffsetDateTime,
}

/// A named counter increment, for the in-process metrics sink (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricEvent {
    /// Counter name, e.g. `executions_completed_total`.
    pub name: String,
    /// Amount to add to the counter.
    pub value: u64,
    /// Optional label pairs (e.g. `playbook_id`).
    pub labels: Vec<(String, String)>,
}
