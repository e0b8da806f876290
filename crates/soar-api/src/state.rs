// crates/soar-api/src/state.rs
// ============================================================================
// Module: Application State
// Description: The shared, cloneable handle axum hands to every route.
// Purpose: Hold the engine, stores, config, and the mutable ingress caches.
// Dependencies: soar-core, soar-config, tokio
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use soar_config::SoarConfig;
use soar_core::store::ApprovalStore;
use soar_core::store::AuditSink;
use soar_core::store::ConnectorStore;
use soar_core::store::ExecutionStore;
use soar_core::store::MetricsSink;
use soar_core::store::PlaybookStore;
use soar_core::store::TriggerStore;
use soar_core::store::WebhookStore;
use soar_core::Engine;
use tokio::sync::Mutex as AsyncMutex;

use crate::nonce_cache::NonceCache;
use crate::rate_limit::RateLimiter;

/// Everything a route handler needs, cloned cheaply per request.
#[derive(Clone)]
pub struct AppState {
    /// The synchronous execution engine, invoked via `spawn_blocking`.
    pub engine: Arc<Engine>,
    /// Playbook store, for CRUD routes the engine itself does not expose.
    pub playbooks: Arc<dyn PlaybookStore>,
    /// Webhook store, for ingress lookups and webhook CRUD.
    pub webhooks: Arc<dyn WebhookStore>,
    /// Trigger store, for trigger CRUD alongside playbooks.
    pub triggers: Arc<dyn TriggerStore>,
    /// Execution store, for execution CRUD and listing.
    pub executions: Arc<dyn ExecutionStore>,
    /// Approval store, for approval listing.
    pub approvals: Arc<dyn ApprovalStore>,
    /// Connector store, for connector CRUD and the test endpoint.
    pub connectors: Arc<dyn ConnectorStore>,
    /// Audit sink, queried by execution detail routes.
    pub audit: Arc<dyn AuditSink>,
    /// Metrics sink, surfaced by `/healthz`.
    pub metrics: Arc<dyn MetricsSink>,
    /// Startup configuration.
    pub config: Arc<SoarConfig>,
    /// Per-source-IP and per-playbook flood limiters (§4.1).
    pub rate_limiter: Arc<RateLimiter>,
    /// Replay-protection nonce cache (§4.1 check 4).
    pub nonce_cache: Arc<Mutex<NonceCache>>,
    /// Per-`execution_id` logical locks, so two concurrent resumes of the
    /// same execution serialize rather than race the engine (§5).
    pub execution_locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl AppState {
    /// Returns (creating if absent) the logical lock for `execution_id`.
    #[must_use]
    pub fn execution_lock(&self, execution_id: &str) -> Arc<AsyncMutex<()>> {
        #[allow(clippy::unwrap_used, reason = "poisoning here means a prior handler panicked while holding the map lock; the process should not continue silently")]
        let mut locks = self.execution_locks.lock().unwrap();
        locks.entry(execution_id.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }
}
