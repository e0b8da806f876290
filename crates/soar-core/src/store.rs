// crates/soar-core/src/store.rs
// ============================================================================
// Module: Entity Store
// Description: Persistence trait set the engine is generic over.
// Purpose: Decouple the engine from any one backing store; `soar-store-sqlite`
//          provides the production implementation, the in-memory store here
//          backs unit and scenario tests.
// Dependencies: std::sync, serde_json
// ============================================================================

//! ## Overview
//! Each trait owns one entity family. The engine takes `&dyn` trait objects
//! (or is generic over them, per call site) rather than a single "database"
//! trait, so `soar-store-sqlite` can implement them against one connection
//! pool while tests substitute an in-memory [`MemoryStore`] for all of them
//! at once.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::identifiers::ApprovalId;
use crate::identifiers::ConnectorId;
use crate::identifiers::ExecutionId;
use crate::identifiers::PlaybookId;
use crate::identifiers::TriggerId;
use crate::identifiers::WebhookId;
use crate::model::Approval;
use crate::model::AuditEvent;
use crate::model::ConnectorRecord;
use crate::model::Execution;
use crate::model::Playbook;
use crate::model::Trigger;
use crate::model::Webhook;

/// Store error, wrapping whatever the concrete backend reports.
pub type StoreResult<T> = Result<T, String>;

/// Playbook versions, keyed by logical id.
pub trait PlaybookStore: Send + Sync {
    /// Inserts a new playbook version.
    fn put(&self, playbook: Playbook) -> StoreResult<()>;
    /// Returns the currently active version for `id`, if any.
    fn get_active(&self, id: &PlaybookId) -> StoreResult<Option<Playbook>>;
    /// Returns a specific version, regardless of active status.
    fn get_version(&self, id: &PlaybookId, version: u32) -> StoreResult<Option<Playbook>>;
    /// Lists every version of `id`.
    fn list_versions(&self, id: &PlaybookId) -> StoreResult<Vec<Playbook>>;
}

/// Webhook ingress configuration, keyed by webhook id.
pub trait WebhookStore: Send + Sync {
    /// Inserts or replaces a webhook record.
    fn put(&self, webhook: Webhook) -> StoreResult<()>;
    /// Returns a webhook by id.
    fn get(&self, id: &WebhookId) -> StoreResult<Option<Webhook>>;
    /// Lists every webhook.
    fn list(&self) -> StoreResult<Vec<Webhook>>;
}

/// Triggers, keyed by id and by the webhook they are bound to.
pub trait TriggerStore: Send + Sync {
    /// Inserts or replaces a trigger.
    fn put(&self, trigger: Trigger) -> StoreResult<()>;
    /// Returns the trigger bound to `webhook_id`, if any.
    fn get_by_webhook(&self, webhook_id: &WebhookId) -> StoreResult<Option<Trigger>>;
    /// Returns a trigger by id.
    fn get(&self, id: &TriggerId) -> StoreResult<Option<Trigger>>;
}

/// Executions, keyed by id.
pub trait ExecutionStore: Send + Sync {
    /// Inserts or replaces an execution.
    fn put(&self, execution: Execution) -> StoreResult<()>;
    /// Returns an execution by id.
    fn get(&self, id: &ExecutionId) -> StoreResult<Option<Execution>>;
    /// Lists executions still in a non-terminal state, for SLA monitoring.
    fn list_open(&self) -> StoreResult<Vec<Execution>>;
}

/// Approvals, keyed by id and by the execution that created them.
pub trait ApprovalStore: Send + Sync {
    /// Inserts or replaces an approval.
    fn put(&self, approval: Approval) -> StoreResult<()>;
    /// Returns an approval by id.
    fn get(&self, id: &ApprovalId) -> StoreResult<Option<Approval>>;
    /// Lists approvals still pending, for timeout sweeping.
    fn list_pending(&self) -> StoreResult<Vec<Approval>>;
}

/// Connector configuration, registered write-once at startup.
pub trait ConnectorStore: Send + Sync {
    /// Inserts or replaces a connector record.
    fn put(&self, connector: ConnectorRecord) -> StoreResult<()>;
    /// Returns a connector record by id.
    fn get(&self, id: &ConnectorId) -> StoreResult<Option<ConnectorRecord>>;
    /// Lists every registered connector.
    fn list(&self) -> StoreResult<Vec<ConnectorRecord>>;
}

/// Append-only audit sink.
pub trait AuditSink: Send + Sync {
    /// Appends one audit entry.
    fn append(&self, event: AuditEvent) -> StoreResult<()>;
    /// Lists audit entries for one execution, in occurrence order.
    fn list_for_execution(&self, execution_id: &ExecutionId) -> StoreResult<Vec<AuditEvent>>;
}

/// In-process counter sink (§4.7). Metrics are process-local, not exported.
pub trait MetricsSink: Send + Sync {
    /// Increments a named counter by `value`.
    fn increment(&self, name: &str, value: u64);
    /// Returns the current value of a named counter, for tests and `/healthz`.
    fn get(&self, name: &str) -> u64;
}

/// An in-memory implementation of every store trait, for tests.
#[derive(Default)]
pub struct MemoryStore {
    playbooks: Mutex<BTreeMap<(PlaybookId, u32), Playbook>>,
    webhooks: Mutex<BTreeMap<WebhookId, Webhook>>,
    triggers: Mutex<BTreeMap<TriggerId, Trigger>>,
    executions: Mutex<BTreeMap<ExecutionId, Execution>>,
    approvals: Mutex<BTreeMap<ApprovalId, Approval>>,
    connectors: Mutex<BTreeMap<ConnectorId, ConnectorRecord>>,
    audit: Mutex<Vec<AuditEvent>>,
    counters: Mutex<BTreeMap<String, u64>>,
}

impl MemoryStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    #[allow(clippy::unwrap_used, reason = "in-memory test store; poisoning indicates a prior test bug")]
    mutex.lock().unwrap()
}

impl PlaybookStore for MemoryStore {
    fn put(&self, playbook: Playbook) -> StoreResult<()> {
        if playbook.active {
            let mut guard = lock(&self.playbooks);
            for existing in guard.values_mut().filter(|existing| existing.playbook_id == playbook.playbook_id) {
                existing.active = false;
            }
        }
        lock(&self.playbooks).insert((playbook.playbook_id.clone(), playbook.version), playbook);
        Ok(())
    }

    fn get_active(&self, id: &PlaybookId) -> StoreResult<Option<Playbook>> {
        Ok(lock(&self.playbooks).values().find(|pb| &pb.playbook_id == id && pb.active).cloned())
    }

    fn get_version(&self, id: &PlaybookId, version: u32) -> StoreResult<Option<Playbook>> {
        Ok(lock(&self.playbooks).get(&(id.clone(), version)).cloned())
    }

    fn list_versions(&self, id: &PlaybookId) -> StoreResult<Vec<Playbook>> {
        Ok(lock(&self.playbooks).values().filter(|pb| &pb.playbook_id == id).cloned().collect())
    }
}

impl WebhookStore for MemoryStore {
    fn put(&self, webhook: Webhook) -> StoreResult<()> {
        lock(&self.webhooks).insert(webhook.webhook_id.clone(), webhook);
        Ok(())
    }

    fn get(&self, id: &WebhookId) -> StoreResult<Option<Webhook>> {
        Ok(lock(&self.webhooks).get(id).cloned())
    }

    fn list(&self) -> StoreResult<Vec<Webhook>> {
        Ok(lock(&self.webhooks).values().cloned().collect())
    }
}

impl TriggerStore for MemoryStore {
    fn put(&self, trigger: Trigger) -> StoreResult<()> {
        lock(&self.triggers).insert(trigger.trigger_id.clone(), trigger);
        Ok(())
    }

    fn get_by_webhook(&self, webhook_id: &WebhookId) -> StoreResult<Option<Trigger>> {
        Ok(lock(&self.triggers).values().find(|trigger| &trigger.webhook_id == webhook_id).cloned())
    }

    fn get(&self, id: &TriggerId) -> StoreResult<Option<Trigger>> {
        Ok(lock(&self.triggers).get(id).cloned())
    }
}

impl ExecutionStore for MemoryStore {
    fn put(&self, execution: Execution) -> StoreResult<()> {
        lock(&self.executions).insert(execution.execution_id.clone(), execution);
        Ok(())
    }

    fn get(&self, id: &ExecutionId) -> StoreResult<Option<Execution>> {
        Ok(lock(&self.executions).get(id).cloned())
    }

    fn list_open(&self) -> StoreResult<Vec<Execution>> {
        Ok(lock(&self.executions).values().filter(|execution| !execution.state.is_terminal()).cloned().collect())
    }
}

impl ApprovalStore for MemoryStore {
    fn put(&self, approval: Approval) -> StoreResult<()> {
        lock(&self.approvals).insert(approval.approval_id.clone(), approval);
        Ok(())
    }

    fn get(&self, id: &ApprovalId) -> StoreResult<Option<Approval>> {
        Ok(lock(&self.approvals).get(id).cloned())
    }

    fn list_pending(&self) -> StoreResult<Vec<Approval>> {
        Ok(lock(&self.approvals).values().filter(|approval| approval.status.is_pending()).cloned().collect())
    }
}

impl ConnectorStore for MemoryStore {
    fn put(&self, connector: ConnectorRecord) -> StoreResult<()> {
        lock(&self.connectors).insert(connector.connector_id.clone(), connector);
        Ok(())
    }

    fn get(&self, id: &ConnectorId) -> StoreResult<Option<ConnectorRecord>> {
        Ok(lock(&self.connectors).get(id).cloned())
    }

    fn list(&self) -> StoreResult<Vec<ConnectorRecord>> {
        Ok(lock(&self.connectors).values().cloned().collect())
    }
}

impl AuditSink for MemoryStore {
    fn append(&self, event: AuditEvent) -> StoreResult<()> {
        lock(&self.audit).push(event);
        Ok(())
    }

    fn list_for_execution(&self, execution_id: &ExecutionId) -> StoreResult<Vec<AuditEvent>> {
        Ok(lock(&self.audit).iter().filter(|event| event.execution_id.as_ref() == Some(execution_id)).cloned().collect())
    }
}

impl MetricsSink for MemoryStore {
    fn increment(&self, name: &str, value: u64) {
        *lock(&self.counters).entry(name.to_string()).or_insert(0) += value;
    }

    fn get(&self, name: &str) -> u64 {
        lock(&self.counters).get(name).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn putting_an_active_version_deactivates_siblings() {
        let store = MemoryStore::new();
        let base = |version: u32, active: bool| Playbook {
            playbook_id: PlaybookId::new("PB-1"),
            version,
            active,
            name: "demo".to_string(),
            dsl: crate::model::PlaybookDsl {
                start_step: crate::identifiers::StepId::new("s1"),
                steps: BTreeMap::new(),
                shadow_mode: false,
            },
        };
        store.put(base(1, true)).expect("put v1");
        store.put(base(2, true)).expect("put v2");
        assert_eq!(store.get_active(&PlaybookId::new("PB-1")).expect("lookup ok").map(|pb| pb.version), Some(2));
        assert!(!store.get_version(&PlaybookId::new("PB-1"), 1).expect("lookup ok").expect("v1 exists").active);
    }
}
