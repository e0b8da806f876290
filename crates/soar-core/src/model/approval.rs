// crates/soar-core/src/model/approval.rs
// ============================================================================
// Module: Approval Record
// Description: A pending human decision suspending an execution (§3.6, §4.4.6).
// Purpose: Model the approval round trip and its terminal decisions.
// Dependencies: serde, time
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::identifiers::ApprovalId;
use crate::identifiers::ExecutionId;
use crate::identifiers::StepId;

/// A human decision point suspending an execution (§3.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approval {
    /// Approval identifier.
    pub approval_id: ApprovalId,
    /// Execution this approval suspends.
    pub execution_id: ExecutionId,
    /// Step that created this approval.
    pub step_id: StepId,
    /// Current status.
    pub status: ApprovalStatus,
    /// Time the approval was created.
    pub created_at: OffsetDateTime,
    /// Time after which the approval times out without a decision.
    pub expires_at: OffsetDateTime,
    /// Time the decision was made, if any.
    pub decided_at: Option<OffsetDateTime>,
    /// Identity of the decider, if recorded.
    pub decided_by: Option<String>,
}

/// The approval's own small state machine (§8 round-trip law).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Awaiting a decision.
    Pending,
    /// Approved; the execution resumes on `on_approved`.
    Approved,
    /// Rejected; the execution resumes on `on_rejected`.
    Rejected,
    /// Timed out without a decision; the execution resumes on `on_timeout`.
    TimedOut,
}

impl ApprovalStatus {
    /// Whether this status still accepts a resume call.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Pending)
    }
}
