// soar-system-tests/tests/retry_backoff.rs
// ============================================================================
// Module: Retry/Backoff System Test
// Description: A connector that fails its first two calls must be retried
//              per the step's retry_policy and ultimately complete the
//              execution once it succeeds (§4.4.5, §8 S4).
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
use soar_core::store::PlaybookStore;
use soar_core::Engine;
use soar_core::SystemClock;

fn flaky_playbook() -> Playbook {
    let mut steps = BTreeMap::new();
    steps.insert(
        StepId::new("A1"),
        Step {
            step_id: StepId::new("A1"),
            kind: StepKind::Action {
                connector: ConnectorId::new("flaky"),
                action_type: "block_ip".to_string(),
                inputs: BTreeMap::from([("ip".to_string(), json!("1.2.3.4"))]),
                retry_policy: RetryPolicy { max_attempts: 2, base_backoff_ms: 1, backoff_multiplier: 1.0 },
                on_success: None,
                on_failure: None,
            },
        },
    );
    Playbook {
        playbook_id: PlaybookId::new("PB-RETRY"),
        version: 1,
        active: true,
        name: "retries-a-flaky-connector".to_string(),
        dsl: PlaybookDsl { start_step: StepId::new("A1"), steps, shadow_mode: false },
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn flaky_connector_is_retried_then_succeeds() -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(MemoryStore::new());
    let mut registry = ConnectorRegistry::new();
    registry.register(
        ConnectorId::new("flaky"),
        ConnectorEntry {
            connector_type: "stub".to_string(),
            name: "flaky".to_string(),
            active: true,
            implementation: Arc::new(StubConnector::failing_first(2)),
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
    );
    store.put(flaky_playbook())?;

    let execution_id = engine.start_execution(&PlaybookId::new("PB-RETRY"), None, json!({}))?;
    let execution = ExecutionStore::get(store.as_ref(), &execution_id)?.ok_or("execution missing after start")?;

    if execution.state != ExecutionState::Completed {
        return Err(format!("expected the execution to complete once the connector recovered, got {:?}", execution.state).into());
    }

    let audit = store.list_for_execution(&execution_id)?;
    let retries = audit.iter().filter(|event| event.action == AuditAction::StepRetried).count();
    if retries != 2 {
        return Err(format!("expected exactly two StepRetried audit events, got {retries}").into());
    }

    Ok(())
}
