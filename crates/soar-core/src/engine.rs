// crates/soar-core/src/engine.rs
// ============================================================================
// Module: Execution Engine
// Description: The step-interpreter loop advancing an execution to completion.
// Purpose: Dispatch each step kind, enforce the state machine (§4.6), retry
//          transient connector failures, and suspend for approvals (§4.4).
// Dependencies: soar-logic, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! [`Engine::advance`] is the only entry point that moves an execution
//! forward. It loops over steps synchronously, in-process, until the
//! execution reaches a terminal state or suspends at an `Approval` step. The
//! loop guard (`MAX_STEP_EXECUTIONS`) exists because a malformed playbook can
//! describe a cycle; without it a single inbound webhook could pin a worker
//! thread forever.

use std::sync::Arc;

use serde_json::Value;

use crate::clock::Clock;
use crate::connector::ConnectorRegistry;
use crate::error::EngineError;
use crate::error::EngineErrorCode;
use crate::identifiers::ApprovalId;
use crate::identifiers::ExecutionId;
use crate::identifiers::PlaybookId;
use crate::identifiers::StepId;
use crate::identifiers::TriggerId;
use crate::model::Approval;
use crate::model::ApprovalStatus;
use crate::model::AuditAction;
use crate::model::AuditEvent;
use crate::model::AuditId;
use crate::model::Execution;
use crate::model::ExecutionState;
use crate::model::StepKind;
use crate::model::StepRecord;
use crate::model::StepState;
use crate::store::ApprovalStore;
use crate::store::AuditSink;
use crate::store::ExecutionStore;
use crate::store::MetricsSink;
use crate::store::PlaybookStore;
use crate::store::TriggerStore;
use crate::template::resolve_inputs;
use crate::trigger::evaluate_trigger;
use crate::validator::normalize_rejection_label;

/// Default maximum step advances a single execution may make before the
/// engine declares a loop and fails the execution (§4.4.3), used when no
/// override is supplied by `soar-config`.
pub const DEFAULT_MAX_STEP_EXECUTIONS: u32 = 1000;

/// A human decision made against a pending approval (§4.4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    /// The step may proceed on `on_approved`.
    Approved,
    /// The step proceeds on `on_rejected` (or fails, if none is declared).
    Rejected,
}

/// The synchronous playbook execution engine (§5, §9).
pub struct Engine {
    playbooks: Arc<dyn PlaybookStore>,
    triggers: Arc<dyn TriggerStore>,
    executions: Arc<dyn ExecutionStore>,
    approvals: Arc<dyn ApprovalStore>,
    connectors: Arc<ConnectorRegistry>,
    audit: Arc<dyn AuditSink>,
    metrics: Arc<dyn MetricsSink>,
    clock: Arc<dyn Clock>,
    max_step_executions: u32,
}

impl Engine {
    /// Builds an engine over the given stores, connector registry, and clock,
    /// using [`DEFAULT_MAX_STEP_EXECUTIONS`] as the loop guard.
    #[must_use]
    #[allow(clippy::too_many_arguments, reason = "one argument per collaborator; a builder would add ceremony with no behavioral benefit at this call count")]
    pub fn new(
        playbooks: Arc<dyn PlaybookStore>,
        triggers: Arc<dyn TriggerStore>,
        executions: Arc<dyn ExecutionStore>,
        approvals: Arc<dyn ApprovalStore>,
        connectors: Arc<ConnectorRegistry>,
        audit: Arc<dyn AuditSink>,
        metrics: Arc<dyn MetricsSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            playbooks,
            triggers,
            executions,
            approvals,
            connectors,
            audit,
            metrics,
            clock,
            max_step_executions: DEFAULT_MAX_STEP_EXECUTIONS,
        }
    }

    /// Overrides the loop-guard threshold, typically sourced from
    /// `soar-config`'s `EngineConfig::max_step_executions`.
    #[must_use]
    pub const fn with_max_step_executions(mut self, max_step_executions: u32) -> Self {
        self.max_step_executions = max_step_executions;
        self
    }

    /// Starts a new execution of the active version of `playbook_id`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if no active version exists.
    pub fn start_execution(
        &self,
        playbook_id: &PlaybookId,
        trigger_id: Option<TriggerId>,
        context: Value,
    ) -> Result<ExecutionId, EngineError> {
        self.start_execution_at(playbook_id, trigger_id, context, None)
    }

    /// As [`Self::start_execution`], but lets the caller supply the instant
    /// the triggering webhook was received, so the SLA acknowledge boundary
    /// (webhook receipt to the engine beginning to advance) can be measured.
    /// Ingress threads its own receipt timestamp through here; any other
    /// caller passes `None` and the dimension stays unassessed.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if the playbook has no active version
    /// or the new execution cannot be persisted.
    pub fn start_execution_at(
        &self,
        playbook_id: &PlaybookId,
        trigger_id: Option<TriggerId>,
        context: Value,
        webhook_received_at: Option<time::OffsetDateTime>,
    ) -> Result<ExecutionId, EngineError> {
        let playbook = self
            .playbooks
            .get_active(playbook_id)
            .map_err(EngineError::Store)?
            .ok_or_else(|| EngineError::Store(format!("no active version for playbook {playbook_id}")))?;
        let now = self.clock.now();
        let execution_id = ExecutionId::new(format!("EXEC-{}", now.unix_timestamp_nanos()));
        let execution = Execution {
            execution_id: execution_id.clone(),
            playbook_id: playbook.playbook_id.clone(),
            playbook_version: playbook.version,
            trigger_id,
            state: ExecutionState::Pending,
            current_step: Some(playbook.dsl.start_step.clone()),
            step_execution_count: 0,
            context: build_initial_context(context, &playbook.playbook_id, playbook.version, &execution_id),
            history: Vec::new(),
            shadow_mode: playbook.dsl.shadow_mode,
            created_at: now,
            updated_at: now,
            webhook_received_at,
            acknowledged_at: Some(now),
            containment_at: None,
            completed_at: None,
            duration_ms: None,
            sla: None,
        };
        self.executions.put(execution).map_err(EngineError::Store)?;
        self.advance(&execution_id)?;
        Ok(execution_id)
    }

    /// Advances `execution_id` until it completes, fails, or suspends.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ExecutionNotFound`], a connector error, or an
    /// [`EngineError::Invariant`] if the playbook graph is malformed.
    pub fn advance(&self, execution_id: &ExecutionId) -> Result<(), EngineError> {
        let mut execution = self
            .executions
            .get(execution_id)
            .map_err(EngineError::Store)?
            .ok_or_else(|| EngineError::ExecutionNotFound(execution_id.clone()))?;
        if execution.state.is_terminal() {
            return Ok(());
        }
        execution.state = ExecutionState::Running;

        let playbook = self
            .playbooks
            .get_version(&execution.playbook_id, execution.playbook_version)
            .map_err(EngineError::Store)?
            .ok_or_else(|| EngineError::Store("bound playbook version missing from store".to_string()))?;

        while let Some(step_id) = execution.current_step.clone() {
            if execution.step_execution_count >= self.max_step_executions {
                return self.terminate(
                    &mut execution,
                    ExecutionState::Failed,
                    EngineErrorCode::LoopDetected,
                );
            }
            let step = playbook.dsl.steps.get(&step_id).ok_or_else(|| EngineError::StepNotFound(step_id.clone()))?;
            execution.step_execution_count += 1;

            let outcome = self.dispatch(&mut execution, &step.kind)?;
            match outcome {
                StepOutcome::Advance(next) => {
                    execution.current_step = next;
                    if next_is_none(&execution.current_step) {
                        return self.terminate_ok(&mut execution, ExecutionState::Completed);
                    }
                }
                StepOutcome::Suspend => {
                    execution.state = ExecutionState::AwaitingApproval;
                    execution.updated_at = self.clock.now();
                    self.executions.put(execution).map_err(EngineError::Store)?;
                    return Ok(());
                }
                StepOutcome::Fail(code) => {
                    return self.terminate(&mut execution, ExecutionState::Failed, code);
                }
            }
        }
        self.terminate_ok(&mut execution, ExecutionState::Completed)
    }

    /// Resolves a pending approval and resumes the suspended execution.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ApprovalNotFound`] or an
    /// [`EngineError::Invariant`] with [`EngineErrorCode::ApprovalNotPending`]
    /// when the approval has already been decided (§8 round-trip law).
    pub fn resume_approval(
        &self,
        approval_id: &ApprovalId,
        decision: ApprovalDecision,
        decided_by: Option<String>,
    ) -> Result<(), EngineError> {
        let mut approval = self
            .approvals
            .get(approval_id)
            .map_err(EngineError::Store)?
            .ok_or_else(|| EngineError::ApprovalNotFound(approval_id.clone()))?;
        let execution_id = approval.execution_id.clone();
        if !approval.status.is_pending() {
            return Err(EngineError::Invariant {
                execution: execution_id,
                code: EngineErrorCode::ApprovalNotPending,
            });
        }
        let now = self.clock.now();
        approval.status = match decision {
            ApprovalDecision::Approved => ApprovalStatus::Approved,
            ApprovalDecision::Rejected => ApprovalStatus::Rejected,
        };
        approval.decided_at = Some(now);
        approval.decided_by = decided_by;
        self.approvals.put(approval.clone()).map_err(EngineError::Store)?;
        self.record_audit(Some(&execution_id), AuditAction::ApprovalDecided, serde_json::json!({"approval_id": approval_id.to_string()}));

        let mut execution = self
            .executions
            .get(&execution_id)
            .map_err(EngineError::Store)?
            .ok_or(EngineError::ExecutionNotFound(execution_id.clone()))?;
        let playbook = self
            .playbooks
            .get_version(&execution.playbook_id, execution.playbook_version)
            .map_err(EngineError::Store)?
            .ok_or_else(|| EngineError::Store("bound playbook version missing from store".to_string()))?;
        let step = playbook
            .dsl
            .steps
            .get(&approval.step_id)
            .ok_or_else(|| EngineError::StepNotFound(approval.step_id.clone()))?;
        let StepKind::Approval { on_approved, on_rejected, on_timeout: _, timeout_seconds: _ } = &step.kind else {
            return Err(EngineError::Invariant {
                execution: execution_id,
                code: EngineErrorCode::InvalidStateTransition,
            });
        };
        if decision == ApprovalDecision::Rejected && on_rejected.as_ref().map(|step_id| normalize_rejection_label(step_id.as_str())) == Some("fail") {
            return self.terminate(&mut execution, ExecutionState::Failed, EngineErrorCode::ApprovalRejected);
        }
        let next = match decision {
            ApprovalDecision::Approved => on_approved.clone(),
            ApprovalDecision::Rejected => on_rejected.as_ref().map(|step_id| StepId::new(normalize_rejection_label(step_id.as_str()))),
        };
        execution.current_step = next;
        execution.state = ExecutionState::Running;
        self.executions.put(execution).map_err(EngineError::Store)?;
        self.advance(&execution_id)
    }

    /// Cancels a non-terminal execution outright, bypassing the step graph.
    /// Used by an operator-initiated cancel, not by any playbook branch.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ExecutionNotFound`]. Canceling an
    /// already-terminal execution is a no-op, not an error.
    pub fn cancel_execution(&self, execution_id: &ExecutionId) -> Result<(), EngineError> {
        let mut execution = self
            .executions
            .get(execution_id)
            .map_err(EngineError::Store)?
            .ok_or_else(|| EngineError::ExecutionNotFound(execution_id.clone()))?;
        if execution.state.is_terminal() {
            return Ok(());
        }
        execution.state = ExecutionState::Failed;
        execution.current_step = None;
        execution.updated_at = self.clock.now();
        self.executions.put(execution.clone()).map_err(EngineError::Store)?;
        self.record_audit(Some(execution_id), AuditAction::ExecutionTerminated, serde_json::json!({"state": "failed", "reason": "cancelled"}));
        Ok(())
    }

    /// Expires a pending approval whose `expires_at` has passed, resuming the
    /// suspended execution on the step's `on_timeout` branch (§4.4.6).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ApprovalNotFound`] or, if the approval is no
    /// longer pending, an [`EngineError::Invariant`] with
    /// [`EngineErrorCode::ApprovalNotPending`].
    pub fn expire_approval(&self, approval_id: &ApprovalId) -> Result<(), EngineError> {
        let mut approval = self
            .approvals
            .get(approval_id)
            .map_err(EngineError::Store)?
            .ok_or_else(|| EngineError::ApprovalNotFound(approval_id.clone()))?;
        let execution_id = approval.execution_id.clone();
        if !approval.status.is_pending() {
            return Err(EngineError::Invariant {
                execution: execution_id,
                code: EngineErrorCode::ApprovalNotPending,
            });
        }
        let now = self.clock.now();
        approval.status = ApprovalStatus::TimedOut;
        approval.decided_at = Some(now);
        self.approvals.put(approval.clone()).map_err(EngineError::Store)?;
        self.record_audit(Some(&execution_id), AuditAction::ApprovalTimedOut, serde_json::json!({"approval_id": approval_id.to_string()}));

        let mut execution = self
            .executions
            .get(&execution_id)
            .map_err(EngineError::Store)?
            .ok_or(EngineError::ExecutionNotFound(execution_id.clone()))?;
        let playbook = self
            .playbooks
            .get_version(&execution.playbook_id, execution.playbook_version)
            .map_err(EngineError::Store)?
            .ok_or_else(|| EngineError::Store("bound playbook version missing from store".to_string()))?;
        let step = playbook
            .dsl
            .steps
            .get(&approval.step_id)
            .ok_or_else(|| EngineError::StepNotFound(approval.step_id.clone()))?;
        let StepKind::Approval { on_timeout, .. } = &step.kind else {
            return Err(EngineError::Invariant {
                execution: execution_id,
                code: EngineErrorCode::InvalidStateTransition,
            });
        };
        if on_timeout.as_ref().map(|step_id| normalize_rejection_label(step_id.as_str())) == Some("fail") {
            return self.terminate(&mut execution, ExecutionState::Failed, EngineErrorCode::ApprovalTimeout);
        }
        execution.current_step = on_timeout.clone();
        execution.state = ExecutionState::Running;
        self.executions.put(execution).map_err(EngineError::Store)?;
        self.advance(&execution_id)
    }

    fn dispatch(&self, execution: &mut Execution, kind: &StepKind) -> Result<StepOutcome, EngineError> {
        match kind {
            StepKind::Enrichment { connector, action_type, inputs, retry_policy, on_success, on_failure } => {
                self.invoke_with_retry(execution, connector, action_type, inputs, retry_policy, on_success.clone(), on_failure.clone())
            }
            StepKind::Condition { trigger, on_true, on_false } => {
                let matched = evaluate_trigger(trigger, &execution.context);
                let next = if matched { on_true.clone() } else { on_false.clone() };
                self.record_step(execution, StepState::Succeeded, Default::default(), Some(serde_json::json!({"matched": matched})));
                if next.is_none() && on_true.is_none() && on_false.is_none() {
                    return Ok(StepOutcome::Fail(EngineErrorCode::ConditionMissingBranch));
                }
                Ok(StepOutcome::Advance(next))
            }
            StepKind::Approval { timeout_seconds, on_timeout, .. } => {
                if *timeout_seconds == 0 || on_timeout.is_none() {
                    return Ok(StepOutcome::Fail(EngineErrorCode::ApprovalMissingOnTimeout));
                }
                let now = self.clock.now();
                let approval = Approval {
                    approval_id: ApprovalId::new(format!("APR-{}", now.unix_timestamp_nanos())),
                    execution_id: execution.execution_id.clone(),
                    step_id: execution.current_step.clone().unwrap_or_else(|| StepId::new("unknown")),
                    status: ApprovalStatus::Pending,
                    created_at: now,
                    expires_at: now + time::Duration::seconds(i64::try_from(*timeout_seconds).unwrap_or(i64::MAX)),
                    decided_at: None,
                    decided_by: None,
                };
                self.approvals.put(approval.clone()).map_err(EngineError::Store)?;
                self.record_step(execution, StepState::Running, Default::default(), None);
                self.record_audit(
                    Some(&execution.execution_id),
                    AuditAction::ApprovalCreated,
                    serde_json::json!({"approval_id": approval.approval_id.to_string()}),
                );
                Ok(StepOutcome::Suspend)
            }
            StepKind::Action { connector, action_type, inputs, retry_policy, on_success, on_failure } => {
                let outcome = if execution.shadow_mode {
                    let resolved = resolve_inputs(inputs, &execution.context);
                    let preview = serde_json::json!({"would_execute": resolved.clone()});
                    self.record_step(execution, StepState::Skipped, resolved, Some(preview));
                    Ok(StepOutcome::Advance(on_success.clone()))
                } else {
                    self.invoke_with_retry(execution, connector, action_type, inputs, retry_policy, on_success.clone(), on_failure.clone())
                };
                if execution.containment_at.is_none() {
                    execution.containment_at = Some(self.clock.now());
                }
                outcome
            }
            StepKind::Notification { connector, inputs, on_success } => {
                if execution.shadow_mode {
                    self.record_step(execution, StepState::Skipped, resolve_inputs(inputs, &execution.context), None);
                    return Ok(StepOutcome::Advance(on_success.clone()));
                }
                let resolved = resolve_inputs(inputs, &execution.context);
                let resolved_value = serde_json::to_value(&resolved).unwrap_or(Value::Null);
                let entry = self.connectors.resolve(connector.as_str()).map_err(EngineError::Connector)?;
                let output = entry
                    .implementation
                    .execute("notify", &resolved_value, std::time::Duration::from_secs(30))
                    .map_err(EngineError::Connector)?;
                self.record_step(execution, StepState::Succeeded, resolved, Some(output));
                Ok(StepOutcome::Advance(on_success.clone()))
            }
        }
    }

    /// Resolves `inputs`, invokes `connector`/`action_type`, and retries
    /// transient failures per `retry_policy` (§4.4.5). Shared by `Enrichment`
    /// (never shadow-skipped) and `Action` (shadow-skipped by the caller).
    #[allow(clippy::too_many_arguments, reason = "mirrors the step kind's own field list; a params struct would not reduce call-site complexity here")]
    fn invoke_with_retry(
        &self,
        execution: &mut Execution,
        connector: &crate::identifiers::ConnectorId,
        action_type: &str,
        inputs: &std::collections::BTreeMap<String, Value>,
        retry_policy: &crate::model::RetryPolicy,
        on_success: Option<StepId>,
        on_failure: Option<StepId>,
    ) -> Result<StepOutcome, EngineError> {
        let resolved = resolve_inputs(inputs, &execution.context);
        let resolved_value = serde_json::to_value(&resolved).unwrap_or(Value::Null);
        let entry = self.connectors.resolve(connector.as_str());
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let outcome = entry
                .as_ref()
                .map_err(Clone::clone)
                .and_then(|entry| entry.implementation.execute(action_type, &resolved_value, std::time::Duration::from_secs(30)));
            match outcome {
                Ok(output) => {
                    self.record_step(execution, StepState::Succeeded, resolved.clone(), Some(output));
                    return Ok(StepOutcome::Advance(on_success));
                }
                Err(err) if err.retryable() && attempt <= retry_policy.max_attempts => {
                    self.record_audit(
                        Some(&execution.execution_id),
                        AuditAction::StepRetried,
                        serde_json::json!({"attempt": attempt, "code": err.code()}),
                    );
                    std::thread::sleep(retry_policy.backoff_for_attempt(attempt));
                    continue;
                }
                Err(err) => {
                    self.record_step(execution, StepState::Failed, resolved.clone(), Some(serde_json::json!({"error": err.code()})));
                    let normalized = on_failure.as_ref().map(|step_id| normalize_rejection_label(step_id.as_str()));
                    if normalized.is_none_or(|label| label == "fail") {
                        return Ok(StepOutcome::Fail(EngineErrorCode::StepFailed));
                    }
                    return Ok(StepOutcome::Advance(normalized.map(StepId::new)));
                }
            }
        }
    }

    fn record_step(
        &self,
        execution: &mut Execution,
        state: StepState,
        resolved_inputs: std::collections::BTreeMap<String, Value>,
        output: Option<Value>,
    ) {
        let now = self.clock.now();
        let step_id = execution.current_step.clone().unwrap_or_else(|| StepId::new("unknown"));
        merge_step_output(&mut execution.context, &step_id, output.as_ref());
        execution.history.push(StepRecord {
            step_id,
            state,
            resolved_inputs,
            output,
            attempt: 1,
            started_at: now,
            finished_at: Some(now),
        });
        execution.updated_at = now;
    }

    fn record_audit(&self, execution_id: Option<&ExecutionId>, action: AuditAction, detail: Value) {
        let now = self.clock.now();
        let _ = self.audit.append(AuditEvent {
            audit_id: AuditId::new(format!("AUD-{}", now.unix_timestamp_nanos())),
            execution_id: execution_id.cloned(),
            action,
            detail,
            occurred_at: now,
        });
        self.metrics.increment(metric_name(action), 1);
    }

    fn terminate_ok(&self, execution: &mut Execution, state: ExecutionState) -> Result<(), EngineError> {
        execution.state = state;
        execution.current_step = None;
        let now = self.clock.now();
        execution.updated_at = now;
        execution.completed_at = Some(now);
        execution.duration_ms = duration_ms_since(execution.created_at, now);
        self.executions.put(execution.clone()).map_err(EngineError::Store)?;
        self.record_audit(Some(&execution.execution_id), AuditAction::ExecutionTerminated, serde_json::json!({"state": "completed"}));
        Ok(())
    }

    fn terminate(
        &self,
        execution: &mut Execution,
        state: ExecutionState,
        code: EngineErrorCode,
    ) -> Result<(), EngineError> {
        execution.state = state;
        execution.current_step = None;
        let now = self.clock.now();
        execution.updated_at = now;
        execution.completed_at = Some(now);
        execution.duration_ms = duration_ms_since(execution.created_at, now);
        self.executions.put(execution.clone()).map_err(EngineError::Store)?;
        self.record_audit(
            Some(&execution.execution_id),
            AuditAction::ExecutionTerminated,
            serde_json::json!({"state": "failed", "code": code.as_str()}),
        );
        if matches!(code, EngineErrorCode::LoopDetected) {
            self.metrics.increment("executions_loop_detected_total", 1);
        }
        Ok(())
    }

    /// Looks up the `soar-api` HTTP boundary's triggerable webhook-to-trigger
    /// binding. Exposed here so ingress can resolve a trigger without a
    /// second store reference.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] on a backend failure.
    pub fn trigger_for_webhook(&self, webhook_id: &crate::identifiers::WebhookId) -> Result<Option<crate::model::Trigger>, EngineError> {
        self.triggers.get_by_webhook(webhook_id).map_err(EngineError::Store)
    }
}

fn metric_name(action: AuditAction) -> &'static str {
    match action {
        AuditAction::WebhookAccepted => "webhooks_accepted_total",
        AuditAction::WebhookRejected => "webhooks_rejected_total",
        AuditAction::StepStarted => "steps_started_total",
        AuditAction::StepCompleted => "steps_completed_total",
        AuditAction::StepRetried => "steps_retried_total",
        AuditAction::ApprovalCreated => "approvals_created_total",
        AuditAction::ApprovalDecided => "approvals_decided_total",
        AuditAction::ApprovalTimedOut => "approvals_timed_out_total",
        AuditAction::ExecutionTerminated => "executions_terminated_total",
        AuditAction::SlaBreached => "sla_breaches_total",
        AuditAction::HealthAlert => "health_alerts_total",
    }
}

fn next_is_none(current: &Option<StepId>) -> bool {
    current.is_none()
}

fn duration_ms_since(start: time::OffsetDateTime, end: time::OffsetDateTime) -> Option<u64> {
    (end - start).whole_milliseconds().max(0).try_into().ok()
}

/// Builds the structured execution context (§4.4.2): `trigger_data` holds the
/// ingress-supplied alert/payload unchanged; `steps` starts empty and is
/// populated by [`merge_step_output`] as each step completes; `playbook` and
/// `execution` carry the identifiers templates and conditions may reference.
fn build_initial_context(trigger_data: Value, playbook_id: &PlaybookId, version: u32, execution_id: &ExecutionId) -> Value {
    serde_json::json!({
        "trigger_data": trigger_data,
        "steps": {},
        "playbook": {"playbook_id": playbook_id.as_str(), "version": version},
        "execution": {"execution_id": execution_id.as_str()},
    })
}

/// Records `step_id`'s output under `context.steps.<step_id>.output` so later
/// steps can reference it via a dotted path or `{{ }}` template (§4.4.2).
fn merge_step_output(context: &mut Value, step_id: &StepId, output: Option<&Value>) {
    let Some(steps) = context.get_mut("steps").and_then(Value::as_object_mut) else {
        return;
    };
    steps.insert(step_id.to_string(), serde_json::json!({"output": output.cloned().unwrap_or(Value::Null)}));
}

enum StepOutcome {
    Advance(Option<StepId>),
    Suspend,
    Fail(EngineErrorCode),
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::clock::FixedClock;
    use crate::connector::ConnectorEntry;
    use crate::connector::ConnectorError;
    use crate::identifiers::ConnectorId;
    use crate::model::Playbook;
    use crate::model::PlaybookDsl;
    use crate::model::Step;
    use crate::store::MemoryStore;

    struct EchoConnector;

    impl crate::connector::Connector for EchoConnector {
        fn schema(&self, _action_type: &str) -> Option<crate::connector::ActionSchema> {
            None
        }

        fn execute(&self, _action_type: &str, inputs: &Value, _timeout: std::time::Duration) -> Result<Value, ConnectorError> {
            Ok(inputs.clone())
        }
    }

    fn build_engine(registry: ConnectorRegistry) -> (Engine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let engine = Engine::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            Arc::new(registry),
            store.clone(),
            store.clone(),
            Arc::new(FixedClock::new(time::OffsetDateTime::UNIX_EPOCH)),
        );
        (engine, store)
    }

    #[test]
    fn enrichment_then_action_completes_the_execution() {
        let mut registry = ConnectorRegistry::new();
        registry.register(
            ConnectorId::new("demo"),
            ConnectorEntry { connector_type: "http".to_string(), name: "demo".to_string(), active: true, implementation: Arc::new(EchoConnector) },
        );
        let (engine, store) = build_engine(registry);

        let mut steps = BTreeMap::new();
        steps.insert(
            StepId::new("enrich"),
            Step {
                step_id: StepId::new("enrich"),
                kind: StepKind::Enrichment {
                    connector: ConnectorId::new("demo"),
                    action_type: "echo".to_string(),
                    inputs: BTreeMap::new(),
                    retry_policy: crate::model::RetryPolicy::default(),
                    on_success: Some(StepId::new("act")),
                    on_failure: None,
                },
            },
        );
        steps.insert(
            StepId::new("act"),
            Step {
                step_id: StepId::new("act"),
                kind: StepKind::Action {
                    connector: ConnectorId::new("demo"),
                    action_type: "echo".to_string(),
                    inputs: BTreeMap::new(),
                    retry_policy: crate::model::RetryPolicy::default(),
                    on_success: None,
                    on_failure: None,
                },
            },
        );
        let playbook = Playbook {
            playbook_id: PlaybookId::new("PB-1"),
            version: 1,
            active: true,
            name: "demo".to_string(),
            dsl: PlaybookDsl { start_step: StepId::new("enrich"), steps, shadow_mode: false },
        };
        store.put(playbook).expect("put playbook");

        let execution_id = engine.start_execution(&PlaybookId::new("PB-1"), None, json!({})).expect("start");
        let execution = store.get(&execution_id).expect("lookup ok").expect("execution exists");
        assert_eq!(execution.state, ExecutionState::Completed);
        assert_eq!(execution.history.len(), 2);
    }

    #[test]
    fn shadow_mode_skips_action_without_invoking_connector() {
        let (engine, store) = build_engine(ConnectorRegistry::new());
        let mut steps = BTreeMap::new();
        steps.insert(
            StepId::new("act"),
            Step {
                step_id: StepId::new("act"),
                kind: StepKind::Action {
                    connector: ConnectorId::new("missing"),
                    action_type: "echo".to_string(),
                    inputs: BTreeMap::new(),
                    retry_policy: crate::model::RetryPolicy::default(),
                    on_success: None,
                    on_failure: None,
                },
            },
        );
        let playbook = Playbook {
            playbook_id: PlaybookId::new("PB-2"),
            version: 1,
            active: true,
            name: "demo".to_string(),
            dsl: PlaybookDsl { start_step: StepId::new("act"), steps, shadow_mode: true },
        };
        store.put(playbook).expect("put playbook");

        let execution_id = engine.start_execution(&PlaybookId::new("PB-2"), None, json!({})).expect("start");
        let execution = store.get(&execution_id).expect("lookup ok").expect("execution exists");
        assert_eq!(execution.state, ExecutionState::Completed);
        assert_eq!(execution.history[0].state, StepState::Skipped);
    }

    #[test]
    fn approval_suspends_and_resumes_on_decision() {
        let (engine, store) = build_engine(ConnectorRegistry::new());
        let mut steps = BTreeMap::new();
        steps.insert(
            StepId::new("ap"),
            Step {
                step_id: StepId::new("ap"),
                kind: StepKind::Approval {
                    timeout_seconds: 60,
                    on_approved: None,
                    on_rejected: None,
                    on_timeout: Some(StepId::new("ap")),
                },
            },
        );
        let playbook = Playbook {
            playbook_id: PlaybookId::new("PB-3"),
            version: 1,
            active: true,
            name: "demo".to_string(),
            dsl: PlaybookDsl { start_step: StepId::new("ap"), steps, shadow_mode: false },
        };
        store.put(playbook).expect("put playbook");

        let execution_id = engine.start_execution(&PlaybookId::new("PB-3"), None, json!({})).expect("start");
        let execution = store.get(&execution_id).expect("lookup ok").expect("execution exists");
        assert_eq!(execution.state, ExecutionState::AwaitingApproval);

        let pending = store.list_pending().expect("list ok");
        assert_eq!(pending.len(), 1);
        engine.resume_approval(&pending[0].approval_id, ApprovalDecision::Approved, Some("alice".to_string())).expect("resume");
        let execution = store.get(&execution_id).expect("lookup ok").expect("execution exists");
        assert_eq!(execution.state, ExecutionState::Completed);

        let err = engine
            .resume_approval(&pending[0].approval_id, ApprovalDecision::Approved, None)
            .expect_err("second resume must be rejected");
        assert!(matches!(err, EngineError::Invariant { code: EngineErrorCode::ApprovalNotPending, .. }));
    }

    #[test]
    fn expiring_an_approval_follows_the_timeout_branch() {
        let mut registry = ConnectorRegistry::new();
        registry.register(
            ConnectorId::new("demo"),
            ConnectorEntry { connector_type: "http".to_string(), name: "demo".to_string(), active: true, implementation: Arc::new(EchoConnector) },
        );
        let (engine, store) = build_engine(registry);
        let mut steps = BTreeMap::new();
        steps.insert(
            StepId::new("ap"),
            Step {
                step_id: StepId::new("ap"),
                kind: StepKind::Approval {
                    timeout_seconds: 60,
                    on_approved: None,
                    on_rejected: None,
                    on_timeout: Some(StepId::new("timed_out")),
                },
            },
        );
        steps.insert(
            StepId::new("timed_out"),
            Step {
                step_id: StepId::new("timed_out"),
                kind: StepKind::Enrichment {
                    connector: ConnectorId::new("demo"),
                    action_type: "echo".to_string(),
                    inputs: BTreeMap::new(),
                    retry_policy: crate::model::RetryPolicy::default(),
                    on_success: None,
                    on_failure: None,
                },
            },
        );
        let playbook = Playbook {
            playbook_id: PlaybookId::new("PB-4"),
            version: 1,
            active: true,
            name: "demo".to_string(),
            dsl: PlaybookDsl { start_step: StepId::new("ap"), steps, shadow_mode: false },
        };
        store.put(playbook).expect("put playbook");

        let execution_id = engine.start_execution(&PlaybookId::new("PB-4"), None, json!({})).expect("start");
        let pending = store.list_pending().expect("list ok");
        assert_eq!(pending.len(), 1);

        engine.expire_approval(&pending[0].approval_id).expect("expire");
        let execution = store.get(&execution_id).expect("lookup ok").expect("execution exists");
        assert_eq!(execution.state, ExecutionState::Completed);
        let approval = store.get(&pending[0].approval_id).expect("lookup ok").expect("approval exists");
        assert_eq!(approval.status, ApprovalStatus::TimedOut);

        let err = engine.expire_approval(&pending[0].approval_id).expect_err("second expiry must be rejected");
        assert!(matches!(err, EngineError::Invariant { code: EngineErrorCode::ApprovalNotPending, .. }));
    }

    #[test]
    fn rejecting_an_approval_with_fail_terminates_the_execution() {
        let (engine, store) = build_engine(ConnectorRegistry::new());
        let mut steps = BTreeMap::new();
        steps.insert(
            StepId::new("ap"),
            Step {
                step_id: StepId::new("ap"),
                kind: StepKind::Approval {
                    timeout_seconds: 60,
                    on_approved: None,
                    on_rejected: Some(StepId::new("stop")),
                    on_timeout: Some(StepId::new("ap")),
                },
            },
        );
        let playbook = Playbook {
            playbook_id: PlaybookId::new("PB-5"),
            version: 1,
            active: true,
            name: "demo".to_string(),
            dsl: PlaybookDsl { start_step: StepId::new("ap"), steps, shadow_mode: false },
        };
        store.put(playbook).expect("put playbook");

        let execution_id = engine.start_execution(&PlaybookId::new("PB-5"), None, json!({})).expect("start");
        let pending = store.list_pending().expect("list ok");
        engine.resume_approval(&pending[0].approval_id, ApprovalDecision::Rejected, None).expect("resume");
        let execution = store.get(&execution_id).expect("lookup ok").expect("execution exists");
        assert_eq!(execution.state, ExecutionState::Failed);
    }

    #[test]
    fn timing_out_an_approval_with_fail_terminates_the_execution() {
        let (engine, store) = build_engine(ConnectorRegistry::new());
        let mut steps = BTreeMap::new();
        steps.insert(
            StepId::new("ap"),
            Step {
                step_id: StepId::new("ap"),
                kind: StepKind::Approval {
                    timeout_seconds: 0,
                    on_approved: None,
                    on_rejected: None,
                    on_timeout: Some(StepId::new("fail")),
                },
            },
        );
        let playbook = Playbook {
            playbook_id: PlaybookId::new("PB-6"),
            version: 1,
            active: true,
            name: "demo".to_string(),
            dsl: PlaybookDsl { start_step: StepId::new("ap"), steps, shadow_mode: false },
        };
        store.put(playbook).expect("put playbook");

        let execution_id = engine.start_execution(&PlaybookId::new("PB-6"), None, json!({})).expect("start");
        let pending = store.list_pending().expect("list ok");
        engine.expire_approval(&pending[0].approval_id).expect("expire");
        let execution = store.get(&execution_id).expect("lookup ok").expect("execution exists");
        assert_eq!(execution.state, ExecutionState::Failed);
    }
}
