// crates/soar-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Entity Store
// Description: WAL-mode SQLite implementation of every soar-core store trait.
// Purpose: Persist playbooks, webhooks, triggers, executions, approvals,
//          connectors, and the audit trail as canonical JSON rows.
// Dependencies: soar-core, rusqlite, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Each entity family gets its own table; the row's `json` column is the
//! entity's canonical `serde_json` serialization and every other column is an
//! indexed lookup key duplicated out of that JSON for querying. Writes open a
//! short-lived transaction per call; `busy_timeout` absorbs lock contention
//! from the rare concurrent writer rather than the caller seeing
//! `SQLITE_BUSY`.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

use rusqlite::params;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use serde::Deserialize;
use thiserror::Error;

use soar_core::identifiers::ApprovalId;
use soar_core::identifiers::ConnectorId;
use soar_core::identifiers::ExecutionId;
use soar_core::identifiers::PlaybookId;
use soar_core::identifiers::TriggerId;
use soar_core::identifiers::WebhookId;
use soar_core::model::Approval;
use soar_core::model::AuditEvent;
use soar_core::model::ConnectorRecord;
use soar_core::model::Execution;
use soar_core::model::Playbook;
use soar_core::model::Trigger;
use soar_core::model::Webhook;
use soar_core::store::ApprovalStore;
use soar_core::store::AuditSink;
use soar_core::store::ConnectorStore;
use soar_core::store::ExecutionStore;
use soar_core::store::MetricsSink;
use soar_core::store::PlaybookStore;
use soar_core::store::StoreResult;
use soar_core::store::TriggerStore;
use soar_core::store::WebhookStore;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const SCHEMA_VERSION: i64 = 1;

/// Configuration for the `SQLite` entity store.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the database file.
    pub path: PathBuf,
    /// Busy timeout applied to lock contention, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

impl SqliteStoreConfig {
    /// Builds a configuration pointed at `path` with default tuning.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS }
    }
}

/// Errors raised opening or operating the `SQLite` store.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// The underlying `SQLite` driver reported a failure.
    #[error("sqlite error: {0}")]
    Db(String),
    /// A stored row's JSON payload failed to deserialize.
    #[error("corrupt row in table {table}: {source}")]
    Corrupt {
        /// Table the corrupt row was read from.
        table: &'static str,
        /// Underlying deserialization error.
        source: serde_json::Error,
    },
}

/// A single-connection, WAL-mode `SQLite` entity store (§6).
pub struct SqliteStore {
    connection: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (creating if absent) the database at `config.path` and applies
    /// the schema and durability pragmas.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Db`] when the connection cannot be opened
    /// or pragmas cannot be applied.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        let connection = open_connection(&config.path, config.busy_timeout_ms)?;
        initialize_schema(&connection)?;
        Ok(Self { connection: Mutex::new(connection) })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        #[allow(clippy::unwrap_used, reason = "a poisoned store mutex means a prior call panicked mid-transaction; the process should not continue silently")]
        self.connection.lock().unwrap()
    }
}

fn open_connection(path: &Path, busy_timeout_ms: u64) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(path, flags).map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection.execute_batch("PRAGMA journal_mode = wal;").map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection.execute_batch("PRAGMA synchronous = normal;").map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .busy_timeout(std::time::Duration::from_millis(busy_timeout_ms))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(connection)
}

fn initialize_schema(connection: &Connection) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch(
            "
            CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);
            CREATE TABLE IF NOT EXISTS playbooks (
                playbook_id TEXT NOT NULL,
                version INTEGER NOT NULL,
                active INTEGER NOT NULL,
                json TEXT NOT NULL,
                PRIMARY KEY (playbook_id, version)
            );
            CREATE TABLE IF NOT EXISTS webhooks (
                webhook_id TEXT PRIMARY KEY,
                json TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS triggers (
                trigger_id TEXT PRIMARY KEY,
                webhook_id TEXT NOT NULL,
                json TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS executions (
                execution_id TEXT PRIMARY KEY,
                state TEXT NOT NULL,
                json TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS approvals (
                approval_id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                json TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS connectors (
                connector_id TEXT PRIMARY KEY,
                json TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS audit_events (
                audit_id TEXT PRIMARY KEY,
                execution_id TEXT,
                occurred_at TEXT NOT NULL,
                json TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS metrics (
                name TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            );
            ",
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let version: Option<i64> = connection
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    if version.is_none() {
        connection
            .execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    }
    Ok(())
}

fn to_store_err(err: rusqlite::Error) -> String {
    err.to_string()
}

impl PlaybookStore for SqliteStore {
    fn put(&self, playbook: Playbook) -> StoreResult<()> {
        let connection = self.lock();
        let json = serde_json::to_string(&playbook).map_err(|err| err.to_string())?;
        if playbook.active {
            connection
                .execute("UPDATE playbooks SET active = 0 WHERE playbook_id = ?1", params![playbook.playbook_id.as_str()])
                .map_err(to_store_err)?;
        }
        connection
            .execute(
                "INSERT INTO playbooks (playbook_id, version, active, json) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(playbook_id, version) DO UPDATE SET active = excluded.active, json = excluded.json",
                params![playbook.playbook_id.as_str(), playbook.version, i64::from(playbook.active), json],
            )
            .map_err(to_store_err)?;
        Ok(())
    }

    fn get_active(&self, id: &PlaybookId) -> StoreResult<Option<Playbook>> {
        let connection = self.lock();
        connection
            .query_row(
                "SELECT json FROM playbooks WHERE playbook_id = ?1 AND active = 1",
                params![id.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(to_store_err)?
            .map(|json| serde_json::from_str(&json).map_err(|err| err.to_string()))
            .transpose()
    }

    fn get_version(&self, id: &PlaybookId, version: u32) -> StoreResult<Option<Playbook>> {
        let connection = self.lock();
        connection
            .query_row(
                "SELECT json FROM playbooks WHERE playbook_id = ?1 AND version = ?2",
                params![id.as_str(), version],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(to_store_err)?
            .map(|json| serde_json::from_str(&json).map_err(|err| err.to_string()))
            .transpose()
    }

    fn list_versions(&self, id: &PlaybookId) -> StoreResult<Vec<Playbook>> {
        let connection = self.lock();
        let mut statement = connection.prepare("SELECT json FROM playbooks WHERE playbook_id = ?1 ORDER BY version").map_err(to_store_err)?;
        let rows = statement
            .query_map(params![id.as_str()], |row| row.get::<_, String>(0))
            .map_err(to_store_err)?;
        rows.map(|row| row.map_err(to_store_err).and_then(|json| serde_json::from_str(&json).map_err(|err| err.to_string())))
            .collect()
    }
}

impl WebhookStore for SqliteStore {
    fn put(&self, webhook: Webhook) -> StoreResult<()> {
        let connection = self.lock();
        let json = serde_json::to_string(&webhook).map_err(|err| err.to_string())?;
        connection
            .execute(
                "INSERT INTO webhooks (webhook_id, json) VALUES (?1, ?2)
                 ON CONFLICT(webhook_id) DO UPDATE SET json = excluded.json",
                params![webhook.webhook_id.as_str(), json],
            )
            .map_err(to_store_err)?;
        Ok(())
    }

    fn get(&self, id: &WebhookId) -> StoreResult<Option<Webhook>> {
        let connection = self.lock();
        connection
            .query_row("SELECT json FROM webhooks WHERE webhook_id = ?1", params![id.as_str()], |row| row.get::<_, String>(0))
            .optional()
            .map_err(to_store_err)?
            .map(|json| serde_json::from_str(&json).map_err(|err| err.to_string()))
            .transpose()
    }

    fn list(&self) -> StoreResult<Vec<Webhook>> {
        let connection = self.lock();
        let mut statement = connection.prepare("SELECT json FROM webhooks").map_err(to_store_err)?;
        let rows = statement.query_map(params![], |row| row.get::<_, String>(0)).map_err(to_store_err)?;
        rows.map(|row| row.map_err(to_store_err).and_then(|json| serde_json::from_str(&json).map_err(|err| err.to_string())))
            .collect()
    }
}

impl TriggerStore for SqliteStore {
    fn put(&self, trigger: Trigger) -> StoreResult<()> {
        let connection = self.lock();
        let json = serde_json::to_string(&trigger).map_err(|err| err.to_string())?;
        connection
            .execute(
                "INSERT INTO triggers (trigger_id, webhook_id, json) VALUES (?1, ?2, ?3)
                 ON CONFLICT(trigger_id) DO UPDATE SET webhook_id = excluded.webhook_id, json = excluded.json",
                params![trigger.trigger_id.as_str(), trigger.webhook_id.as_str(), json],
            )
            .map_err(to_store_err)?;
        Ok(())
    }

    fn get_by_webhook(&self, webhook_id: &WebhookId) -> StoreResult<Option<Trigger>> {
        let connection = self.lock();
        connection
            .query_row("SELECT json FROM triggers WHERE webhook_id = ?1", params![webhook_id.as_str()], |row| row.get::<_, String>(0))
            .optional()
            .map_err(to_store_err)?
            .map(|json| serde_json::from_str(&json).map_err(|err| err.to_string()))
            .transpose()
    }

    fn get(&self, id: &TriggerId) -> StoreResult<Option<Trigger>> {
        let connection = self.lock();
        connection
            .query_row("SELECT json FROM triggers WHERE trigger_id = ?1", params![id.as_str()], |row| row.get::<_, String>(0))
            .optional()
            .map_err(to_store_err)?
            .map(|json| serde_json::from_str(&json).map_err(|err| err.to_string()))
            .transpose()
    }
}

impl ExecutionStore for SqliteStore {
    fn put(&self, execution: Execution) -> StoreResult<()> {
        let connection = self.lock();
        let json = serde_json::to_string(&execution).map_err(|err| err.to_string())?;
        let state = serde_json::to_value(execution.state).map_err(|err| err.to_string())?;
        connection
            .execute(
                "INSERT INTO executions (execution_id, state, json) VALUES (?1, ?2, ?3)
                 ON CONFLICT(execution_id) DO UPDATE SET state = excluded.state, json = excluded.json",
                params![execution.execution_id.as_str(), state.to_string(), json],
            )
            .map_err(to_store_err)?;
        Ok(())
    }

    fn get(&self, id: &ExecutionId) -> StoreResult<Option<Execution>> {
        let connection = self.lock();
        connection
            .query_row("SELECT json FROM executions WHERE execution_id = ?1", params![id.as_str()], |row| row.get::<_, String>(0))
            .optional()
            .map_err(to_store_err)?
            .map(|json| serde_json::from_str(&json).map_err(|err| err.to_string()))
            .transpose()
    }

    fn list_open(&self) -> StoreResult<Vec<Execution>> {
        let connection = self.lock();
        let mut statement = connection
            .prepare("SELECT json FROM executions WHERE state NOT IN ('\"completed\"', '\"failed\"', '\"rejected\"')")
            .map_err(to_store_err)?;
        let rows = statement.query_map(params![], |row| row.get::<_, String>(0)).map_err(to_store_err)?;
        rows.map(|row| row.map_err(to_store_err).and_then(|json| serde_json::from_str(&json).map_err(|err| err.to_string())))
            .collect()
    }
}

impl ApprovalStore for SqliteStore {
    fn put(&self, approval: Approval) -> StoreResult<()> {
        let connection = self.lock();
        let json = serde_json::to_string(&approval).map_err(|err| err.to_string())?;
        let status = serde_json::to_value(approval.status).map_err(|err| err.to_string())?;
        connection
            .execute(
                "INSERT INTO approvals (approval_id, status, json) VALUES (?1, ?2, ?3)
                 ON CONFLICT(approval_id) DO UPDATE SET status = excluded.status, json = excluded.json",
                params![approval.approval_id.as_str(), status.to_string(), json],
            )
            .map_err(to_store_err)?;
        Ok(())
    }

    fn get(&self, id: &ApprovalId) -> StoreResult<Option<Approval>> {
        let connection = self.lock();
        connection
            .query_row("SELECT json FROM approvals WHERE approval_id = ?1", params![id.as_str()], |row| row.get::<_, String>(0))
            .optional()
            .map_err(to_store_err)?
            .map(|json| serde_json::from_str(&json).map_err(|err| err.to_string()))
            .transpose()
    }

    fn list_pending(&self) -> StoreResult<Vec<Approval>> {
        let connection = self.lock();
        let mut statement = connection.prepare("SELECT json FROM approvals WHERE status = '\"pending\"'").map_err(to_store_err)?;
        let rows = statement.query_map(params![], |row| row.get::<_, String>(0)).map_err(to_store_err)?;
        rows.map(|row| row.map_err(to_store_err).and_then(|json| serde_json::from_str(&json).map_err(|err| err.to_string())))
            .collect()
    }
}

impl ConnectorStore for SqliteStore {
    fn put(&self, connector: ConnectorRecord) -> StoreResult<()> {
        let connection = self.lock();
        let json = serde_json::to_string(&connector).map_err(|err| err.to_string())?;
        connection
            .execute(
                "INSERT INTO connectors (connector_id, json) VALUES (?1, ?2)
                 ON CONFLICT(connector_id) DO UPDATE SET json = excluded.json",
                params![connector.connector_id.as_str(), json],
            )
            .map_err(to_store_err)?;
        Ok(())
    }

    fn get(&self, id: &ConnectorId) -> StoreResult<Option<ConnectorRecord>> {
        let connection = self.lock();
        connection
            .query_row("SELECT json FROM connectors WHERE connector_id = ?1", params![id.as_str()], |row| row.get::<_, String>(0))
            .optional()
            .map_err(to_store_err)?
            .map(|json| serde_json::from_str(&json).map_err(|err| err.to_string()))
            .transpose()
    }

    fn list(&self) -> StoreResult<Vec<ConnectorRecord>> {
        let connection = self.lock();
        let mut statement = connection.prepare("SELECT json FROM connectors").map_err(to_store_err)?;
        let rows = statement.query_map(params![], |row| row.get::<_, String>(0)).map_err(to_store_err)?;
        rows.map(|row| row.map_err(to_store_err).and_then(|json| serde_json::from_str(&json).map_err(|err| err.to_string())))
            .collect()
    }
}

impl AuditSink for SqliteStore {
    fn append(&self, event: AuditEvent) -> StoreResult<()> {
        let connection = self.lock();
        let json = serde_json::to_string(&event).map_err(|err| err.to_string())?;
        connection
            .execute(
                "INSERT INTO audit_events (audit_id, execution_id, occurred_at, json) VALUES (?1, ?2, ?3, ?4)",
                params![
                    event.audit_id.as_str(),
                    event.execution_id.as_ref().map(soar_core::identifiers::ExecutionId::as_str),
                    event.occurred_at.unix_timestamp(),
                    json
                ],
            )
            .map_err(to_store_err)?;
        Ok(())
    }

    fn list_for_execution(&self, execution_id: &ExecutionId) -> StoreResult<Vec<AuditEvent>> {
        let connection = self.lock();
        let mut statement = connection
            .prepare("SELECT json FROM audit_events WHERE execution_id = ?1 ORDER BY occurred_at")
            .map_err(to_store_err)?;
        let rows = statement.query_map(params![execution_id.as_str()], |row| row.get::<_, String>(0)).map_err(to_store_err)?;
        rows.map(|row| row.map_err(to_store_err).and_then(|json| serde_json::from_str(&json).map_err(|err| err.to_string())))
            .collect()
    }
}

impl MetricsSink for SqliteStore {
    fn increment(&self, name: &str, value: u64) {
        let connection = self.lock();
        let _ = connection.execute(
            "INSERT INTO metrics (name, value) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET value = value + excluded.value",
            params![name, value],
        );
    }

    fn get(&self, name: &str) -> u64 {
        let connection = self.lock();
        connection
            .query_row("SELECT value FROM metrics WHERE name = ?1", params![name], |row| row.get::<_, i64>(0))
            .optional()
            .ok()
            .flatten()
            .and_then(|value| u64::try_from(value).ok())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use soar_core::identifiers::StepId;
    use soar_core::model::PlaybookDsl;

    use super::*;

    fn temp_store() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = SqliteStoreConfig::new(dir.path().join("soar.db"));
        (SqliteStore::open(&config).expect("open store"), dir)
    }

    #[test]
    fn playbook_round_trips_and_activation_is_exclusive() {
        let (store, _dir) = temp_store();
        let dsl = PlaybookDsl { start_step: StepId::new("s1"), steps: BTreeMap::new(), shadow_mode: false };
        let v1 = Playbook { playbook_id: PlaybookId::new("PB-1"), version: 1, active: true, name: "demo".to_string(), dsl: dsl.clone() };
        let v2 = Playbook { playbook_id: PlaybookId::new("PB-1"), version: 2, active: true, name: "demo".to_string(), dsl };
        store.put(v1).expect("put v1");
        store.put(v2).expect("put v2");
        let active = store.get_active(&PlaybookId::new("PB-1")).expect("lookup ok").expect("active exists");
        assert_eq!(active.version, 2);
        let stale = store.get_version(&PlaybookId::new("PB-1"), 1).expect("lookup ok").expect("v1 exists");
        assert!(!stale.active);
    }

    #[test]
    fn metrics_increment_accumulates_across_calls() {
        let (store, _dir) = temp_store();
        store.increment("executions_completed_total", 1);
        store.increment("executions_completed_total", 2);
        assert_eq!(store.get("executions_completed_total"), 3);
    }
}
