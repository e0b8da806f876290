// soar-system-tests/tests/smoke.rs
// ============================================================================
// Module: Smoke / Happy Path System Test
// Description: End-to-end webhook-to-completion run over the real HTTP
//              surface, plus the HMAC tamper-rejection invariant (§8).
// Purpose: Exercise ingress, trigger matching, enrichment, condition, and
//          action dispatch together exactly as a real caller would.
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
use soar_core::model::Operator;
use soar_core::model::Playbook;
use soar_core::model::PlaybookDsl;
use soar_core::model::RateLimitConfig;
use soar_core::model::RetryPolicy;
use soar_core::model::Step;
use soar_core::model::StepKind;
use soar_core::model::Trigger;
use soar_core::model::Webhook;
use soar_core::model::WebhookStats;
use soar_core::model::WebhookStatus;
use soar_core::store::PlaybookStore;
use soar_core::store::TriggerStore;
use soar_core::store::WebhookStore;
use soar_logic::MatchMode;

fn demo_playbook() -> Playbook {
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
                    playbook_id: PlaybookId::new("PB-1"),
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
                inputs: BTreeMap::from([("status".to_string(), json!("blocked"))]),
                retry_policy: RetryPolicy::default(),
                on_success: None,
                on_failure: None,
            },
        },
    );
    Playbook {
        playbook_id: PlaybookId::new("PB-1"),
        version: 1,
        active: true,
        name: "ssh-brute-force-response".to_string(),
        dsl: PlaybookDsl { start_step: StepId::new("E1"), steps, shadow_mode: false },
    }
}

fn demo_webhook() -> Webhook {
    Webhook {
        webhook_id: WebhookId::new("WH-1"),
        status: WebhookStatus::Active,
        secret: support::TEST_SECRET_HEX.to_string(),
        require_hmac: true,
        timestamp_tolerance_seconds: 300,
        rate_limit: RateLimitConfig { per_ip_per_minute: 60, playbook_floods_per_minute: 120 },
        stats: WebhookStats::default(),
    }
}

fn demo_trigger() -> Trigger {
    Trigger {
        trigger_id: TriggerId::new("T-1"),
        webhook_id: WebhookId::new("WH-1"),
        playbook_id: PlaybookId::new("PB-1"),
        match_mode: MatchMode::All,
        conditions: vec![Condition { field: "rule.id".to_string(), operator: Operator::Equals, value: json!("5710") }],
        enabled: true,
    }
}

fn demo_connectors() -> Vec<ConnectorRecord> {
    vec![
        ConnectorRecord { connector_id: ConnectorId::new("vt"), connector_type: "stub".to_string(), name: "virustotal".to_string(), active: true, config: json!({}) },
        ConnectorRecord { connector_id: ConnectorId::new("blocklist"), connector_type: "stub".to_string(), name: "blocklist".to_string(), active: true, config: json!({}) },
    ]
}

#[tokio::test(flavor = "multi_thread")]
async fn webhook_to_completed_execution_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let (state, store) = support::build_state(demo_connectors(), SoarConfig::default());
    store.put(demo_playbook())?;
    store.put(demo_webhook())?;
    store.put(demo_trigger())?;
    let server = support::spawn_server(state).await?;

    let body = serde_json::to_vec(&json!({"rule": {"id": "5710", "level": 10}, "data": {"srcip": "1.2.3.4"}}))?;
    let timestamp = support::now_unix();
    let signature = support::sign_webhook(support::TEST_SECRET_HEX, timestamp, &body)?;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/webhook/WH-1", server.base_url()))
        .header("x-soar-timestamp", timestamp.to_string())
        .header("x-soar-signature", signature)
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await?;
    if response.status() != reqwest::StatusCode::ACCEPTED {
        return Err(format!("expected 202 Accepted, got {}", response.status()).into());
    }
    let accepted: serde_json::Value = response.json().await?;
    let Some(execution_id) = accepted.get("execution_id").and_then(serde_json::Value::as_str) else {
        return Err("accepted body missing execution_id".into());
    };

    let execution: soar_core::model::Execution =
        client.get(format!("{}/executions/{execution_id}", server.base_url())).send().await?.json().await?;
    if execution.state != soar_core::model::ExecutionState::Completed {
        return Err(format!("expected execution to complete, got {:?}", execution.state).into());
    }
    let step_states: Vec<_> = execution.history.iter().map(|record| record.state).collect();
    if step_states != vec![soar_core::model::StepState::Succeeded; 3] {
        return Err(format!("expected three succeeded steps, got {step_states:?}").into());
    }
    let blocked_status = execution.context.pointer("/steps/A1/output/status").and_then(serde_json::Value::as_str);
    if blocked_status != Some("blocked") {
        return Err(format!("expected steps.A1.output.status == \"blocked\", got {blocked_status:?}").into());
    }

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn tampered_signature_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let (state, store) = support::build_state(demo_connectors(), SoarConfig::default());
    store.put(demo_playbook())?;
    store.put(demo_webhook())?;
    store.put(demo_trigger())?;
    let server = support::spawn_server(state).await?;

    let body = serde_json::to_vec(&json!({"rule": {"id": "5710"}, "data": {"srcip": "1.2.3.4"}}))?;
    let timestamp = support::now_unix();
    let signature = support::sign_webhook(support::TEST_SECRET_HEX, timestamp, &body)?;
    let tampered_body = serde_json::to_vec(&json!({"rule": {"id": "5710"}, "data": {"srcip": "6.6.6.6"}}))?;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/webhook/WH-1", server.base_url()))
        .header("x-soar-timestamp", timestamp.to_string())
        .header("x-soar-signature", signature)
        .header("content-type", "application/json")
        .body(tampered_body)
        .send()
        .await?;
    if response.status() != reqwest::StatusCode::UNAUTHORIZED {
        return Err(format!("expected 401 for a body/signature mismatch, got {}", response.status()).into());
    }

    server.shutdown().await;
    Ok(())
}
