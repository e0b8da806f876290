// crates/soar-core/src/sla.rs
// ============================================================================
// Module: SLA Tracking
// Description: Policy selection, per-dimension deadline assessment, and
//              breach classification.
// Purpose: Attach and monitor per-execution SLA deadlines across the
//          acknowledge/containment/resolution dimensions (§4.7).
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! An SLA policy is selected by scope precedence: a policy scoped to the
//! execution's playbook wins over one scoped to the alert's severity, which
//! wins over the global default. Each policy carries three independent time
//! budgets. [`assess`] is pull-based: the health monitor (or any caller) asks
//! it to compute each dimension's actual elapsed time as of the injected
//! clock's current time, rather than the engine pushing breach notifications
//! on a fixed schedule. A dimension whose boundary instant hasn't happened
//! yet (e.g. `containment` before any action step has completed) reports
//! `actual_ms: None` and `breached: false` — it is not yet assessable, not
//! passing.

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::identifiers::PlaybookId;
use crate::identifiers::SlaPolicyId;
use crate::model::BreachReason;
use crate::model::Execution;
use crate::model::SlaDimension;
use crate::model::SlaStatus;
use crate::model::StepState;

/// The scope an SLA policy applies to, in precedence order (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SlaScope {
    /// Applies only to executions of one playbook.
    Playbook(PlaybookId),
    /// Applies to executions whose alert carries this severity.
    Severity(String),
    /// Applies when no more specific policy matches.
    Default,
}

/// An SLA policy: a scope and the three time budgets it enforces (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaPolicy {
    /// Policy identifier.
    pub policy_id: SlaPolicyId,
    /// Scope this policy applies to.
    pub scope: SlaScope,
    /// Maximum time, from webhook receipt, to the engine acknowledging it.
    pub acknowledge_ms: u64,
    /// Maximum time, from creation, to the first completed action step.
    pub containment_ms: u64,
    /// Maximum time, from creation, to reach a terminal state.
    pub resolution_ms: u64,
}

/// Selects the highest-precedence policy applicable to `playbook_id`/`severity`.
#[must_use]
pub fn select_policy<'a>(
    policies: &'a [SlaPolicy],
    playbook_id: &PlaybookId,
    severity: Option<&str>,
) -> Option<&'a SlaPolicy> {
    policies
        .iter()
        .find(|policy| matches!(&policy.scope, SlaScope::Playbook(scoped) if scoped == playbook_id))
        .or_else(|| {
            severity.and_then(|severity| {
                policies
                    .iter()
                    .find(|policy| matches!(&policy.scope, SlaScope::Severity(scoped) if scoped == severity))
            })
        })
        .or_else(|| policies.iter().find(|policy| matches!(policy.scope, SlaScope::Default)))
}

/// Assesses `execution` against `policy` as of `now`, computing each
/// dimension's actual elapsed time (where its boundary has been reached) and
/// classifying the breach reason if any dimension breached.
#[must_use]
pub fn assess(policy: &SlaPolicy, execution: &Execution, now: OffsetDateTime) -> SlaStatus {
    let acknowledge = match (execution.webhook_received_at, execution.acknowledged_at) {
        (Some(received), Some(acknowledged)) => SlaDimension::observed(policy.acknowledge_ms, elapsed_ms(received, acknowledged)),
        _ => SlaDimension::pending(policy.acknowledge_ms),
    };
    let containment = match execution.containment_at {
        Some(contained) => SlaDimension::observed(policy.containment_ms, elapsed_ms(execution.created_at, contained)),
        None => SlaDimension::pending(policy.containment_ms),
    };
    let resolution_instant = execution.completed_at.filter(|_| execution.state.is_terminal());
    let resolution = match resolution_instant {
        Some(completed) => SlaDimension::observed(policy.resolution_ms, elapsed_ms(execution.created_at, completed)),
        None if now >= execution.created_at + time::Duration::milliseconds(i64::try_from(policy.resolution_ms).unwrap_or(i64::MAX)) => {
            SlaDimension::observed(policy.resolution_ms, elapsed_ms(execution.created_at, now))
        }
        None => SlaDimension::pending(policy.resolution_ms),
    };
    let breach_reason = if acknowledge.breached || containment.breached || resolution.breached {
        Some(classify_breach_reason(execution))
    } else {
        None
    };
    SlaStatus { policy_id: policy.policy_id.clone(), acknowledge, containment, resolution, breach_reason }
}

/// Classifies why `execution` breached, by inspecting its step history
/// (§4.7): a step that failed on a non-transient error is an automation
/// failure; a step that failed on a timeout/connection-class error after
/// running past [`LONG_STEP_DURATION_MS`] points at an external dependency;
/// a suspended approval (a step record left `Running`, since the engine
/// never rewrites it on resume) points at a human in the loop; anything else
/// defaults to an external dependency delay, since a breach with no single
/// attributable step is most often compounding latency rather than an
/// outright break.
fn classify_breach_reason(execution: &Execution) -> BreachReason {
    let hard_failure = execution.history.iter().any(|record| {
        record.state == StepState::Failed
            && !record.output.as_ref().is_some_and(|output| is_transient_error_code(output))
    });
    if hard_failure {
        return BreachReason::AutomationFailure;
    }
    let slow_transient_failure = execution.history.iter().any(|record| {
        record.state == StepState::Failed
            && record.output.as_ref().is_some_and(|output| is_transient_error_code(output))
            && record.finished_at.is_some_and(|finished| elapsed_ms(record.started_at, finished) > LONG_STEP_DURATION_MS)
    });
    if slow_transient_failure {
        return BreachReason::ExternalDependencyDelay;
    }
    let suspended_on_approval = execution.history.iter().any(|record| record.state == crate::model::StepState::Running);
    if suspended_on_approval {
        return BreachReason::ManualInterventionDelay;
    }
    BreachReason::ExternalDependencyDelay
}

/// Step durations longer than this, combined with a timeout/connection-class
/// failure, are attributed to an external dependency rather than automation.
const LONG_STEP_DURATION_MS: u64 = 5_000;

fn is_transient_error_code(output: &serde_json::Value) -> bool {
    matches!(output.get("error").and_then(serde_json::Value::as_str), Some("CONNECTOR_TIMEOUT" | "CONNECTION_FAILED" | "SERVICE_UNAVAILABLE"))
}

fn elapsed_ms(start: OffsetDateTime, end: OffsetDateTime) -> u64 {
    (end - start).whole_milliseconds().max(0).try_into().unwrap_or(u64::MAX)
}
