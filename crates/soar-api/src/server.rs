// crates/soar-api/src/server.rs
// ============================================================================
// Module: HTTP Server
// Description: Router assembly and the process entry point.
// Purpose: Wire every route to `AppState` and bind the listening socket.
// Dependencies: axum, tokio, soar-core, soar-config
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::routing::patch;
use axum::routing::post;
use axum::routing::put;
use axum::Router;
use soar_core::Engine;
use thiserror::Error;

use crate::ingress;
use crate::routes;
use crate::routes::health;
use crate::state::AppState;

/// Failure starting the HTTP server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that failed to bind.
        addr: SocketAddr,
        /// Underlying I/O failure.
        source: std::io::Error,
    },
    /// The server loop exited with an I/O error.
    #[error("server loop failed: {0}")]
    Serve(std::io::Error),
}

/// Assembles the full route table over `state`.
#[must_use]
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/webhook/{webhook_id}", post(ingress::handle_webhook))
        .route("/playbooks", post(routes::create_playbook))
        .route("/playbooks/{id}", put(routes::update_playbook).get(routes::get_playbook))
        .route("/playbooks/{id}/toggle", patch(routes::toggle_playbook))
        .route("/playbooks/{id}/versions", get(routes::list_playbook_versions))
        .route("/triggers", post(routes::create_trigger))
        .route("/triggers/{id}", get(routes::get_trigger))
        .route("/triggers/{id}/toggle", patch(routes::toggle_trigger))
        .route("/executions", get(routes::list_executions).post(routes::create_execution))
        .route("/executions/{id}", get(routes::get_execution))
        .route("/executions/{id}/cancel", patch(routes::cancel_execution))
        .route("/approvals", get(routes::list_pending_approvals))
        .route("/approvals/{id}", get(routes::get_approval))
        .route("/approvals/{id}/approve", post(routes::approve_approval))
        .route("/approvals/{id}/reject", post(routes::reject_approval))
        .route("/connectors", post(routes::create_connector).get(routes::list_connectors))
        .route("/connectors/{id}", get(routes::get_connector))
        .route("/connectors/{id}/test", post(routes::test_connector))
        .route("/webhooks", post(routes::create_webhook).get(routes::list_webhooks))
        .route("/webhooks/{id}", get(routes::get_webhook))
        .route("/webhooks/{id}/rotate-secret", post(routes::rotate_webhook_secret))
        .route("/webhooks/{id}/status", patch(routes::set_webhook_status))
        .route("/healthz", get(health::liveness))
        .route("/readyz", get(health::readiness))
        .with_state(state)
}

/// Binds `addr` and serves the full route table until the process stops.
///
/// Also spawns the background SLA/approval-timeout sweep (§4.7). There is no
/// TLS termination here; deployments front this with a reverse proxy, the
/// same posture the engine's webhook signature check assumes (§4.1).
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the socket cannot be bound, or
/// [`ServerError::Serve`] if the accept loop fails.
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<(), ServerError> {
    tokio::spawn(crate::sla_monitor::run(state.clone()));
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|source| ServerError::Bind { addr, source })?;
    tracing::info!(%addr, "soar-api listening");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .map_err(ServerError::Serve)
}

/// Convenience constructor for [`AppState`] wiring an in-process [`Engine`]
/// and the ingress caches sized from `config`.
#[must_use]
pub fn build_state(
    engine: Arc<Engine>,
    playbooks: Arc<dyn soar_core::store::PlaybookStore>,
    webhooks: Arc<dyn soar_core::store::WebhookStore>,
    triggers: Arc<dyn soar_core::store::TriggerStore>,
    executions: Arc<dyn soar_core::store::ExecutionStore>,
    approvals: Arc<dyn soar_core::store::ApprovalStore>,
    connectors: Arc<dyn soar_core::store::ConnectorStore>,
    audit: Arc<dyn soar_core::store::AuditSink>,
    metrics: Arc<dyn soar_core::store::MetricsSink>,
    config: Arc<soar_config::SoarConfig>,
) -> AppState {
    let nonce_cache = crate::nonce_cache::NonceCache::new(config.ingress.nonce_cache_capacity, std::time::Duration::from_secs(120));
    AppState {
        engine,
        playbooks,
        webhooks,
        triggers,
        executions,
        approvals,
        connectors,
        audit,
        metrics,
        config,
        rate_limiter: Arc::new(crate::rate_limit::RateLimiter::new()),
        nonce_cache: Arc::new(std::sync::Mutex::new(nonce_cache)),
        execution_locks: Arc::new(std::sync::Mutex::new(std::collections::HashMap::new())),
    }
}
