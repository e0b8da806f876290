// soar-system-tests/tests/loop_guard.rs
// ============================================================================
// Module: Loop Guard System Test
// Description: A playbook whose step branches back to itself must not spin
//              forever; the engine's step-execution ceiling must terminate
//              it as failed (§4.4.7, §8 S6).
// Dependencies: soar-system-tests support harness
// ============================================================================

#[path = "support/mod.rs"]
mod support;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;
use soar_connectors::StubConnector;
use soar_core::connector::ConnectorEntry;
use soar_core::connector::ConnectorRegistry;
use soar_core::identifiers::ConnectorId;
use soar_core::identifiers::PlaybookId;
use soar_core::identifiers::StepId;
use soar_core::model::AuditAction;
use soar_core::model::ExecutionState;
use soar_core::model::Playbook;
use soar_core::model::PlaybookDsl;
use soar_core::model::RetryPolicy;
use soar_core::model::Step;
use soar_core::model::StepKind;
use soar_core::store::AuditSink;
use soar_core::store::ExecutionStore;
use soar_core::store::MemoryStore;
use soar_core::store::MetricsSink;
use soar_core::store::PlaybookStore;
use soar_core::Engine;
use soar_core::SystemClock;

fn self_looping_playbook() -> Playbook {
    let mut steps = BTreeMap::new();
    steps.insert(
        StepId::new("A1"),
        Step {
            step_id: StepId::new("A1"),
            kind: StepKind::Action {
                connector: ConnectorId::new("blocklist"),
                action_type: "block_ip".to_string(),
                inputs: BTreeMap::from([("ip".to_string(), json!("1.2.3.4"))]),
                retry_policy: RetryPolicy::default(),
                on_success: Some(StepId::new("A1")),
                on_failure: None,
            },
        },
    );
    Playbook {
        playbook_id: PlaybookId::new("PB-LOOP"),
        version: 1,
        active: true,
        name: "accidentally-self-referential".to_string(),
        dsl: PlaybookDsl { start_step: StepId::new("A1"), steps, shadow_mode: false },
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn self_referencing_step_is_terminated_by_the_execution_ceiling() -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(MemoryStore::new());
    let mut registry = ConnectorRegistry::new();
    registry.register(
        ConnectorId::new("blocklist"),
        ConnectorEntry {
            connector_type: "stub".to_string(),
            name: "blocklist".to_string(),
            active: true,
            implementation: Arc::new(StubConnector::new()),
        },
    );
    let engine = Engine::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(registry),
        store.clone(),
        store.clone(),
        Arc::new(SystemClock),
    )
    .with_max_step_executions(25);
    store.put(self_looping_playbook())?;

    let execution_id = engine.start_execution(&PlaybookId::new("PB-LOOP"), None, json!({}))?;
    let execution = ExecutionStore::get(store.as_ref(), &execution_id)?.ok_or("execution missing after start")?;

    if execution.state != ExecutionState::Failed {
        return Err(format!("expected the loop guard to fail the execution, got {:?}", execution.state).into());
    }
    if execution.step_execution_count < 25 {
        return Err(format!("expected the step-execution ceiling to have been hit, counted {}", execution.step_execution_count).into());
    }

    let audit = store.list_for_execution(&execution_id)?;
    let terminal_event = audit
        .iter()
        .rev()
        .find(|event| event.action == AuditAction::ExecutionTerminated)
        .ok_or("no ExecutionTerminated audit event was recorded")?;
    if terminal_event.detail.get("code").and_then(serde_json::Value::as_str) != Some("LOOP_DETECTED") {
        return Err(format!("expected the terminal audit event to carry code=LOOP_DETECTED, got {:?}", terminal_event.detail).into());
    }

    let terminated_total = MetricsSink::get(store.as_ref(), "executions_terminated_total");
    if terminated_total < 1 {
        return Err("expected the generic termination counter to have been incremented".into());
    }

    let loop_detected_total = MetricsSink::get(store.as_ref(), "executions_loop_detected_total");
    if loop_detected_total < 1 {
        return Err("expected the dedicated loop-detected counter to have been incremented".into());
    }

    Ok(())
}
