// soar-system-tests/tests/replay_protection.rs
// ============================================================================
// Module: Replay Protection System Test
// Description: Replaying an already-accepted webhook request (same
//              timestamp and body, hence the same nonce) must be rejected
//              and must not start a second execution (§4.1, §8 S5).
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
use soar_core::model::Step;
use soar_core::model::StepKind;
use soar_core::model::Trigger;
use soar_core::model::Webhook;
use soar_core::model::WebhookStats;
use soar_core::model::WebhookStatus;
use soar_core::store::ExecutionStore;
use soar_core::store::PlaybookStore;
use soar_core::store::TriggerStore;
use soar_core::store::WebhookStore;
use soar_logic::MatchMode;

fn single_step_playbook() -> Playbook {
    let mut steps = BTreeMap::new();
    steps.insert(
        StepId::new("AP1"),
        Step {
            step_id: StepId::new("AP1"),
            kind: StepKind::Approval {
                timeout_seconds: 300,
                on_approved: None,
                on_rejected: None,
                on_timeout: Some(StepId::new("fail")),
            },
        },
    );
    Playbook {
        playbook_id: PlaybookId::new("PB-REPLAY"),
        version: 1,
        active: true,
        name: "suspends-awaiting-approval".to_string(),
        dsl: PlaybookDsl { start_step: StepId::new("AP1"), steps, shadow_mode: false },
    }
}

fn demo_webhook() -> Webhook {
    Webhook {
        webhook_id: WebhookId::new("WH-REPLAY"),
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
        trigger_id: TriggerId::new("T-REPLAY"),
        webhook_id: WebhookId::new("WH-REPLAY"),
        playbook_id: PlaybookId::new("PB-REPLAY"),
        match_mode: MatchMode::All,
        conditions: vec![Condition { field: "rule.id".to_string(), operator: Operator::Equals, value: json!("5710") }],
        enabled: true,
    }
}

fn demo_connectors() -> Vec<ConnectorRecord> {
    vec![ConnectorRecord {
        connector_id: ConnectorId::new("blocklist"),
        connector_type: "stub".to_string(),
        name: "blocklist".to_string(),
        active: true,
        config: json!({}),
    }]
}

#[tokio::test(flavor = "multi_thread")]
async fn replayed_webhook_request_is_rejected_and_starts_no_second_execution() -> Result<(), Box<dyn std::error::Error>> {
    let (state, store) = support::build_state(demo_connectors(), SoarConfig::default());
    store.put(single_step_playbook())?;
    store.put(demo_webhook())?;
    store.put(demo_trigger())?;
    let server = support::spawn_server(state).await?;

    let body = serde_json::to_vec(&json!({"rule": {"id": "5710"}, "data": {"srcip": "1.2.3.4"}}))?;
    let timestamp = support::now_unix();
    let signature = support::sign_webhook(support::TEST_SECRET_HEX, timestamp, &body)?;

    let client = reqwest::Client::new();
    let send_once = || {
        let client = client.clone();
        let body = body.clone();
        let signature = signature.clone();
        let url = format!("{}/webhook/WH-REPLAY", server.base_url());
        async move {
            client
                .post(url)
                .header("x-soar-timestamp", timestamp.to_string())
                .header("x-soar-signature", signature)
                .header("content-type", "application/json")
                .body(body)
                .send()
                .await
        }
    };

    let first = send_once().await?;
    if first.status() != reqwest::StatusCode::ACCEPTED {
        return Err(format!("first request should be accepted, got {}", first.status()).into());
    }

    let second = send_once().await?;
    if second.status() != reqwest::StatusCode::BAD_REQUEST {
        return Err(format!("replayed request should be rejected as a duplicate nonce, got {}", second.status()).into());
    }
    let error_body: serde_json::Value = second.json().await?;
    if error_body.get("code").and_then(serde_json::Value::as_str) != Some("DUPLICATE_NONCE") {
        return Err(format!("expected code=DUPLICATE_NONCE, got {error_body:?}").into());
    }

    let open_executions = ExecutionStore::list_open(store.as_ref())?;
    if open_executions.len() != 1 {
        return Err(format!("replay must not start a second execution, found {} open", open_executions.len()).into());
    }

    server.shutdown().await;
    Ok(())
}
