// soar-system-tests/tests/shadow_mode.rs
// ============================================================================
// Module: Shadow Mode System Test
// Description: A playbook flagged `shadow_mode` must reach every step it
//              would reach live, but an Action step must be skipped rather
//              than dispatched to its connector (§4.4.6, §8 S2).
// Dependencies: soar-system-tests support harness
// ============================================================================

#[path = "support/mod.rs"]
mod support;

use std::collections::BTreeMap;

use serde_json::json;
use soar_config::SoarConfig;
use soar_core::identifiers::ConnectorId;
use soar_core::identifiers::PlaybookId;
use soar_core::identifiers::StepId;
use soar_core::identifiers::TriggerId;
use soar_core::identifiers::WebhookId;
use soar_core::model::Condition;
use soar_core::model::ConnectorRecord;
use soar_core::model::ExecutionState;
use soar_core::model::Operator;
use soar_core::model::Playbook;
use soar_core::model::PlaybookDsl;
use soar_core::model::RetryPolicy;
use soar_core::model::Step;
use soar_core::model::StepKind;
use soar_core::model::StepState;
use soar_core::model::Trigger;
use soar_core::store::PlaybookStore;
use soar_logic::MatchMode;

fn shadow_playbook() -> Playbook {
    let mut steps = BTreeMap::new();
    steps.insert(
        StepId::new("E1"),
        Step {
            step_id: StepId::new("E1"),
            kind: StepKind::Enrichment {
                connector: ConnectorId::new("vt"),
                action_type: "lookup_ip".to_string(),
                inputs: BTreeMap::from([("reputation_score".to_string(), json!(80))]),
                retry_policy: RetryPolicy::default(),
                on_success: Some(StepId::new("C1")),
                on_failure: None,
            },
        },
    );
    steps.insert(
        StepId::new("C1"),
        Step {
            step_id: StepId::new("C1"),
            kind: StepKind::Condition {
                trigger: Trigger {
                    trigger_id: TriggerId::new("T-inline"),
                    webhook_id: WebhookId::new("WH-1"),
                    playbook_id: PlaybookId::new("PB-SHADOW"),
                    match_mode: MatchMode::All,
                    conditions: vec![Condition {
                        field: "steps.E1.output.reputation_score".to_string(),
                        operator: Operator::Gte,
                        value: json!(50),
                    }],
                    enabled: true,
                },
                on_true: Some(StepId::new("A1")),
                on_false: None,
            },
        },
    );
    steps.insert(
        StepId::new("A1"),
        Step {
            step_id: StepId::new("A1"),
            kind: StepKind::Action {
                connector: ConnectorId::new("blocklist"),
                action_type: "block_ip".to_string(),
                inputs: BTreeMap::from([("ip".to_string(), json!("1.2.3.4"))]),
                retry_policy: RetryPolicy::default(),
                on_success: None,
                on_failure: None,
            },
        },
    );
    Playbook {
        playbook_id: PlaybookId::new("PB-SHADOW"),
        version: 1,
        active: true,
        name: "shadow-dry-run".to_string(),
        dsl: PlaybookDsl { start_step: StepId::new("E1"), steps, shadow_mode: true },
    }
}

fn demo_connectors() -> Vec<ConnectorRecord> {
    vec![
        ConnectorRecord { connector_id: ConnectorId::new("vt"), connector_type: "stub".to_string(), name: "virustotal".to_string(), active: true, config: json!({}) },
        ConnectorRecord { connector_id: ConnectorId::new("blocklist"), connector_type: "stub".to_string(), name: "blocklist".to_string(), active: true, config: json!({}) },
    ]
}

#[tokio::test(flavor = "multi_thread")]
async fn shadow_execution_skips_action_but_still_enriches_and_evaluates() -> Result<(), Box<dyn std::error::Error>> {
    let (state, store) = support::build_state(demo_connectors(), SoarConfig::default());
    store.put(shadow_playbook())?;

    let execution_id = state.engine.start_execution(&PlaybookId::new("PB-SHADOW"), None, json!({}))?;
    let execution = soar_core::store::ExecutionStore::get(store.as_ref(), &execution_id)?
        .ok_or("execution vanished from the store immediately after creation")?;

    if execution.state != ExecutionState::Completed {
        return Err(format!("shadow execution should still reach a terminal completed state, got {:?}", execution.state).into());
    }
    if execution.history.len() != 3 {
        return Err(format!("expected three recorded steps, got {}", execution.history.len()).into());
    }

    let action_record = execution.history.iter().find(|record| record.step_id.as_str() == "A1")
        .ok_or("A1 never appears in history")?;
    if action_record.state != StepState::Skipped {
        return Err(format!("A1 must be recorded as Skipped in shadow mode, got {:?}", action_record.state).into());
    }
    let would_execute_ip = action_record.output.as_ref().and_then(|output| output.pointer("/would_execute/ip")).and_then(serde_json::Value::as_str);
    if would_execute_ip != Some("1.2.3.4") {
        return Err(format!("expected a would_execute preview carrying the resolved inputs, got {:?}", action_record.output).into());
    }

    let enrichment_record = execution.history.iter().find(|record| record.step_id.as_str() == "E1")
        .ok_or("E1 never appears in history")?;
    if enrichment_record.state != StepState::Succeeded {
        return Err(format!("E1 must still run live in shadow mode, got {:?}", enrichment_record.state).into());
    }
    let enriched_score = execution.context.pointer("/steps/E1/output/reputation_score").and_then(serde_json::Value::as_i64);
    if enriched_score != Some(80) {
        return Err(format!("expected the enrichment connector to have actually run, got {enriched_score:?}").into());
    }

    Ok(())
}
