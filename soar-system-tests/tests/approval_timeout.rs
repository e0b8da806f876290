// soar-system-tests/tests/approval_timeout.rs
// ============================================================================
// Module: Approval Timeout System Test
// Description: An approval step whose deadline passes with nobody deciding
//              must fail the execution when on_timeout is the "fail"/"stop"
//              sentinel (§4.4.6, §8 S3).
// Dependencies: soar-system-tests support harness
// ============================================================================

#[path = "support/mod.rs"]
mod support;

use std::collections::BTreeMap;

use serde_json::json;
use soar_config::SoarConfig;
use soar_core::identifiers::PlaybookId;
use soar_core::identifiers::StepId;
use soar_core::model::ExecutionState;
use soar_core::model::Playbook;
use soar_core::model::PlaybookDsl;
use soar_core::model::Step;
use soar_core::model::StepKind;
use soar_core::store::ApprovalStore;
use soar_core::store::ExecutionStore;
use soar_core::store::PlaybookStore;

fn approval_playbook(on_timeout: &str) -> Playbook {
    let mut steps = BTreeMap::new();
    steps.insert(
        StepId::new("AP1"),
        Step {
            step_id: StepId::new("AP1"),
            kind: StepKind::Approval {
                timeout_seconds: 1,
                on_approved: None,
                on_rejected: None,
                on_timeout: Some(StepId::new(on_timeout)),
            },
        },
    );
    Playbook {
        playbook_id: PlaybookId::new("PB-APPROVAL"),
        version: 1,
        active: true,
        name: "requires-human-approval".to_string(),
        dsl: PlaybookDsl { start_step: StepId::new("AP1"), steps, shadow_mode: false },
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn unanswered_approval_fails_the_execution_on_expiry() -> Result<(), Box<dyn std::error::Error>> {
    let (state, store) = support::build_state(Vec::new(), SoarConfig::default());
    store.put(approval_playbook("fail"))?;

    let execution_id = state.engine.start_execution(&PlaybookId::new("PB-APPROVAL"), None, json!({}))?;
    let execution = ExecutionStore::get(store.as_ref(), &execution_id)?.ok_or("execution missing right after creation")?;
    if execution.state != ExecutionState::AwaitingApproval {
        return Err(format!("expected the execution to suspend awaiting approval, got {:?}", execution.state).into());
    }

    let pending = store.list_pending()?;
    let approval = pending.iter().find(|approval| approval.execution_id == execution_id)
        .ok_or("no pending approval was created for this execution")?;

    state.engine.expire_approval(&approval.approval_id)?;

    let execution = ExecutionStore::get(store.as_ref(), &execution_id)?.ok_or("execution vanished after expiry")?;
    if execution.state != ExecutionState::Failed {
        return Err(format!("expected the execution to fail once its approval timed out, got {:?}", execution.state).into());
    }

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_is_accepted_as_a_synonym_for_fail() -> Result<(), Box<dyn std::error::Error>> {
    let (state, store) = support::build_state(Vec::new(), SoarConfig::default());
    store.put(approval_playbook("stop"))?;

    let execution_id = state.engine.start_execution(&PlaybookId::new("PB-APPROVAL"), None, json!({}))?;
    let pending = store.list_pending()?;
    let approval = pending.iter().find(|approval| approval.execution_id == execution_id)
        .ok_or("no pending approval was created for this execution")?;

    state.engine.expire_approval(&approval.approval_id)?;

    let execution = ExecutionStore::get(store.as_ref(), &execution_id)?.ok_or("execution vanished after expiry")?;
    if execution.state != ExecutionState::Failed {
        return Err(format!("\"stop\" must behave identically to \"fail\", got {:?}", execution.state).into());
    }

    Ok(())
}
