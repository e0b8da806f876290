// crates/soar-api/src/sla_monitor.rs
// ============================================================================
// Module: Background SLA and Platform Health Sweep
// Description: Periodic sweep that expires overdue approvals, assesses
//              per-execution SLA breaches across all three dimensions, and
//              tracks rolling platform health counters (§4.7).
// Purpose: Replace the engine's pull-based `sla::assess` with a push-based
//          background loop so breaches, health alerts, and timeouts surface
//          without a caller.
// Dependencies: tokio, soar-core
// ============================================================================

//! ## Overview
//! There is no `SlaPolicyStore` in `soar-core::store` — SLA policies are
//! never persisted per playbook or per severity. The monitor instead
//! synthesizes one [`SlaPolicy`] of [`SlaScope::Default`] from
//! [`soar_config::SlaThresholds`] at startup and applies it to every open
//! execution uniformly. A per-playbook/per-severity policy store is a
//! natural extension point, not implemented here (see DESIGN.md).
//!
//! The health counters ([`HealthMonitor`]) need a signal `soar-core::store`
//! doesn't expose directly: no store trait lists *terminal* executions, only
//! open ones. The monitor works around this by diffing the open set between
//! consecutive ticks — an execution id present last tick but absent this
//! tick just went terminal, and a single `get` recovers its final state. This
//! keeps the health monitor a pure consumer of the existing store traits
//! rather than growing the entity store a query surface only it would use.

use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;
use std::time::Duration as StdDuration;

use soar_core::identifiers::ExecutionId;
use soar_core::identifiers::PlaybookId;
use soar_core::model::AuditAction;
use soar_core::model::AuditEvent;
use soar_core::model::ExecutionState;
use soar_core::sla;
use soar_core::sla::SlaPolicy;
use soar_core::sla::SlaScope;
use time::Duration;
use time::OffsetDateTime;

use crate::state::AppState;

const SWEEP_INTERVAL: StdDuration = StdDuration::from_secs(5);
const ROLLING_WINDOW: Duration = Duration::hours(1);
const STALE_APPROVAL_FACTOR: i64 = 2;
const MIN_SAMPLES_FOR_RATE: usize = 3;
const FAILURE_RATE_THRESHOLD: f64 = 0.5;
const DROP_RATE_THRESHOLD: f64 = 0.5;

/// Runs the sweep loop until the process is torn down.
///
/// Spawned once from [`crate::server::serve`]; never returns under normal
/// operation.
pub async fn run(state: AppState) {
    let policy = SlaPolicy {
        policy_id: soar_core::identifiers::SlaPolicyId::new("default"),
        scope: SlaScope::Default,
        acknowledge_ms: state.config.sla.acknowledge_ms,
        containment_ms: state.config.sla.containment_ms,
        resolution_ms: state.config.sla.resolution_ms,
    };
    let mut health = HealthMonitor::default();
    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        ticker.tick().await;
        sweep_pending_approvals(&state);
        sweep_sla_breaches(&state, &policy);
        health.tick(&state);
    }
}

fn sweep_pending_approvals(state: &AppState) {
    let Ok(pending) = state.approvals.list_pending() else {
        tracing::warn!("sla_monitor: failed to list pending approvals");
        return;
    };
    let now = OffsetDateTime::now_utc();
    for approval in pending {
        if approval.expires_at > now {
            continue;
        }
        let engine = state.engine.clone();
        let approval_id = approval.approval_id.clone();
        match engine.expire_approval(&approval_id) {
            Ok(()) => tracing::info!(approval_id = %approval_id, "expired overdue approval"),
            Err(error) => tracing::warn!(approval_id = %approval_id, %error, "failed to expire overdue approval"),
        }
    }
}

fn sweep_sla_breaches(state: &AppState, policy: &SlaPolicy) {
    let Ok(open) = state.executions.list_open() else {
        tracing::warn!("sla_monitor: failed to list open executions");
        return;
    };
    let now = OffsetDateTime::now_utc();
    for mut execution in open {
        let already_breached = execution.sla.as_ref().is_some_and(soar_core::model::SlaStatus::any_breached);
        let status = sla::assess(policy, &execution, now);
        let newly_breached = status.any_breached() && !already_breached;
        execution.sla = Some(status);
        let execution_id = execution.execution_id.clone();
        if state.executions.put(execution).is_err() {
            tracing::warn!(execution_id = %execution_id, "failed to persist SLA status");
            continue;
        }
        if !newly_breached {
            continue;
        }
        state.metrics.increment("sla_breaches_total", 1);
        let _ = state.audit.append(AuditEvent {
            audit_id: soar_core::identifiers::AuditId::new(format!("AUD-{}", OffsetDateTime::now_utc().unix_timestamp_nanos())),
            execution_id: Some(execution_id.clone()),
            action: AuditAction::SlaBreached,
            detail: serde_json::json!({}),
            occurred_at: now,
        });
        tracing::warn!(execution_id = %execution_id, "execution breached its SLA");
    }
}

/// Rolling platform health counters (§4.7): execution backlog size, SLA
/// breach rate over the trailing hour, per-playbook failure rate over the
/// trailing hour, webhook ingestion drop rate against its own trailing-hour
/// baseline, and stale pending approvals. Alerts are de-duplicated: a
/// condition that's still tripped on the next tick does not re-alert, and
/// clearing the condition lets it re-fire later.
#[derive(Default)]
struct HealthMonitor {
    previously_open: HashMap<ExecutionId, PlaybookId>,
    breach_samples: VecDeque<OffsetDateTime>,
    failure_samples: HashMap<PlaybookId, VecDeque<OffsetDateTime>>,
    completion_samples: HashMap<PlaybookId, VecDeque<OffsetDateTime>>,
    drop_rate_baseline: Option<f64>,
    active_alerts: HashSet<String>,
}

impl HealthMonitor {
    fn tick(&mut self, state: &AppState) {
        let Ok(open) = state.executions.list_open() else {
            tracing::warn!("sla_monitor: failed to list open executions for health tracking");
            return;
        };
        let now = OffsetDateTime::now_utc();
        let open_ids: HashSet<_> = open.iter().map(|execution| execution.execution_id.clone()).collect();

        for (execution_id, playbook_id) in &self.previously_open {
            if open_ids.contains(execution_id) {
                continue;
            }
            let Ok(Some(execution)) = state.executions.get(execution_id) else {
                continue;
            };
            self.completion_samples.entry(playbook_id.clone()).or_default().push_back(now);
            if matches!(execution.state, ExecutionState::Failed | ExecutionState::Rejected) {
                self.failure_samples.entry(playbook_id.clone()).or_default().push_back(now);
            }
            if execution.sla.as_ref().is_some_and(soar_core::model::SlaStatus::any_breached) {
                self.breach_samples.push_back(now);
            }
        }
        self.previously_open = open.iter().map(|execution| (execution.execution_id.clone(), execution.playbook_id.clone())).collect();

        prune(&mut self.breach_samples, now);
        for samples in self.failure_samples.values_mut() {
            prune(samples, now);
        }
        for samples in self.completion_samples.values_mut() {
            prune(samples, now);
        }

        self.raise_or_clear("backlog", open.len() > 100, serde_json::json!({"backlog": open.len()}), state, now);

        let breach_rate_tripped = open.len() >= MIN_SAMPLES_FOR_RATE && self.breach_samples.len() * 2 > open.len();
        self.raise_or_clear(
            "sla_breach_rate",
            breach_rate_tripped,
            serde_json::json!({"breaches_last_hour": self.breach_samples.len(), "open": open.len()}),
            state,
            now,
        );

        for (playbook_id, completions) in &self.completion_samples {
            if completions.len() < MIN_SAMPLES_FOR_RATE {
                continue;
            }
            let failures = self.failure_samples.get(playbook_id).map_or(0, VecDeque::len);
            #[allow(clippy::cast_precision_loss, reason = "rolling-window sample counts never approach f64's precision limit")]
            let rate = failures as f64 / completions.len() as f64;
            self.raise_or_clear(
                &format!("playbook_failure_rate:{playbook_id}"),
                rate > FAILURE_RATE_THRESHOLD,
                serde_json::json!({"playbook_id": playbook_id.to_string(), "failure_rate": rate}),
                state,
                now,
            );
        }

        let accepted = state.metrics.get("webhooks_accepted_total");
        let dropped = state.metrics.get("webhooks_dropped_total");
        let total = accepted + dropped;
        if total >= 10 {
            #[allow(clippy::cast_precision_loss, reason = "webhook totals never approach f64's precision limit")]
            let current_rate = dropped as f64 / total as f64;
            let baseline = *self.drop_rate_baseline.get_or_insert(current_rate);
            let drop_spiked = current_rate > DROP_RATE_THRESHOLD && current_rate > baseline * 1.5;
            self.raise_or_clear(
                "webhook_drop_rate",
                drop_spiked,
                serde_json::json!({"current_rate": current_rate, "baseline_rate": baseline}),
                state,
                now,
            );
            self.drop_rate_baseline = Some(baseline.mul_add(0.9, current_rate * 0.1));
        }

        let Ok(pending) = state.approvals.list_pending() else {
            return;
        };
        let acknowledge_ms = i64::try_from(state.config.sla.acknowledge_ms).unwrap_or(i64::MAX);
        let stale_threshold = Duration::milliseconds(acknowledge_ms.saturating_mul(STALE_APPROVAL_FACTOR));
        let stale_count = pending.iter().filter(|approval| now - approval.created_at > stale_threshold).count();
        self.raise_or_clear("stale_approvals", stale_count > 0, serde_json::json!({"stale_count": stale_count}), state, now);
    }

    fn raise_or_clear(&mut self, kind: &str, tripped: bool, detail: serde_json::Value, state: &AppState, now: OffsetDateTime) {
        if !tripped {
            self.active_alerts.remove(kind);
            return;
        }
        if !self.active_alerts.insert(kind.to_string()) {
            return;
        }
        state.metrics.increment("health_alerts_total", 1);
        let _ = state.audit.append(AuditEvent {
            audit_id: soar_core::identifiers::AuditId::new(format!("AUD-{}", now.unix_timestamp_nanos())),
            execution_id: None,
            action: AuditAction::HealthAlert,
            detail: serde_json::json!({"kind": kind, "detail": detail}),
            occurred_at: now,
        });
        tracing::warn!(kind, "platform health alert");
    }
}

fn prune(samples: &mut VecDeque<OffsetDateTime>, now: OffsetDateTime) {
    while let Some(&front) = samples.front() {
        if now - front > ROLLING_WINDOW {
            samples.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prune_drops_only_samples_older_than_the_rolling_window() {
        let now = OffsetDateTime::UNIX_EPOCH + Duration::hours(10);
        let mut samples = VecDeque::from(vec![now - Duration::hours(2), now - Duration::minutes(30), now]);
        prune(&mut samples, now);
        assert_eq!(samples.len(), 2);
    }

    #[test]
    fn health_monitor_dedupes_a_still_tripped_alert() {
        let mut seen = HashSet::new();
        assert!(seen.insert("backlog".to_string()));
        assert!(!seen.insert("backlog".to_string()));
    }
}
