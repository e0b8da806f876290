// crates/soar-api/src/routes.rs
// ============================================================================
// Module: REST Routes
// Description: Playbook/execution/approval/connector/webhook CRUD (§6).
// Purpose: The operator-facing surface over the entity store and engine.
// Dependencies: axum, soar-core, soar-connectors, rand
// ============================================================================

//! ## Overview
//! Every handler here either answers straight from a store trait object (a
//! synchronous, in-memory-cheap call — no `spawn_blocking` needed) or bridges
//! into [`soar_core::Engine`] through `spawn_blocking`, serialized per
//! `execution_id` where a resume could race a concurrent one (§5). List
//! endpoints are bounded by what the store traits in `soar-core::store`
//! expose: there is no "list everything" query, only the lookups the engine
//! and SLA monitor themselves need (playbook versions by id, open executions,
//! pending approvals, all webhooks, all connectors).

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::Json;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use soar_core::engine::ApprovalDecision;
use soar_core::error::EngineError;
use soar_core::identifiers::ApprovalId;
use soar_core::identifiers::ConnectorId;
use soar_core::identifiers::ExecutionId;
use soar_core::identifiers::PlaybookId;
use soar_core::identifiers::TriggerId;
use soar_core::identifiers::WebhookId;
use soar_core::model::Approval;
use soar_core::model::AuditAction;
use soar_core::model::AuditEvent;
use soar_core::model::ConnectorRecord;
use soar_core::model::Execution;
use soar_core::model::Playbook;
use soar_core::model::PlaybookDsl;
use soar_core::model::RateLimitConfig as WebhookRateLimitConfig;
use soar_core::model::Trigger;
use soar_core::model::Webhook;
use soar_core::model::WebhookStatus;
use soar_core::validator::validate_playbook;
use soar_core::validator::validate_playbook_id;
use soar_core::validator::ValidationIssue;
use soar_core::validator::ValidationSeverity;

use crate::connector_registry;
use crate::state::AppState;

/// A uniform JSON error body for every non-2xx route response.
#[derive(Serialize)]
struct ApiErrorBody {
    error: String,
}

struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(ApiErrorBody { error: self.1 })).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(error: EngineError) -> Self {
        let status = match &error {
            EngineError::ExecutionNotFound(_) | EngineError::ApprovalNotFound(_) | EngineError::StepNotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Invariant { .. } | EngineError::Validation(_) => StatusCode::CONFLICT,
            EngineError::Connector(_) | EngineError::Store(_) | EngineError::Ingress(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self(status, error.to_string())
    }
}

fn store_error(message: String) -> ApiError {
    ApiError(StatusCode::INTERNAL_SERVER_ERROR, message)
}

fn not_found(what: &str) -> ApiError {
    ApiError(StatusCode::NOT_FOUND, format!("{what} not found"))
}

// ----------------------------------------------------------------------
// Playbooks
// ----------------------------------------------------------------------

/// Body for `POST /playbooks`. Rejects a body carrying `version` or
/// `enabled` (§6) — those are engine-managed, not caller-settable at
/// creation.
#[derive(Deserialize)]
pub struct CreatePlaybookRequest {
    /// Caller-supplied identifier, validated against `PB-[A-Z0-9_-]+`.
    pub playbook_id: String,
    /// Display name.
    pub name: String,
    /// The step graph to validate and persist.
    pub dsl: PlaybookDsl,
}

/// Body for `PUT /playbooks/{id}`. Carries no `playbook_id` — that comes
/// from the path.
#[derive(Deserialize)]
pub struct UpdatePlaybookRequest {
    /// Display name.
    pub name: String,
    /// The step graph to validate and persist.
    pub dsl: PlaybookDsl,
    /// Whether the new version should become active. Omitted or any value
    /// other than `false` activates it, atomically deactivating the prior
    /// active version (§6); `Some(false)` stages the new version inactive
    /// and leaves the prior active version in place.
    #[serde(default)]
    pub enabled: Option<bool>,
}

fn validation_errors(issues: &[ValidationIssue]) -> Vec<&ValidationIssue> {
    issues.iter().filter(|issue| issue.severity == ValidationSeverity::Error).collect()
}

/// `POST /playbooks` — creates version 1 under the caller-supplied id,
/// active immediately.
pub async fn create_playbook(State(state): State<AppState>, Json(request): Json<CreatePlaybookRequest>) -> Result<Response, ApiError> {
    if !validate_playbook_id(&request.playbook_id) {
        return Err(ApiError(StatusCode::UNPROCESSABLE_ENTITY, "playbook_id must match PB-[A-Z0-9_-]+".to_string()));
    }
    let issues = validate_playbook(&request.dsl);
    if !validation_errors(&issues).is_empty() {
        return Ok((StatusCode::UNPROCESSABLE_ENTITY, Json(issues)).into_response());
    }
    let playbook_id = PlaybookId::new(request.playbook_id);
    if !state.playbooks.list_versions(&playbook_id).map_err(store_error)?.is_empty() {
        return Err(ApiError(StatusCode::CONFLICT, format!("playbook {playbook_id} already exists")));
    }
    let playbook = Playbook { playbook_id, version: 1, active: true, name: request.name, dsl: request.dsl };
    state.playbooks.put(playbook.clone()).map_err(store_error)?;
    Ok((StatusCode::CREATED, Json(playbook)).into_response())
}

/// `PUT /playbooks/{id}` — creates version N+1. Unless `enabled == false`,
/// the new version activates and the prior active version is deactivated in
/// the same call (§3.1 single-active-version invariant, §6).
pub async fn update_playbook(
    State(state): State<AppState>,
    Path(playbook_id): Path<String>,
    Json(request): Json<UpdatePlaybookRequest>,
) -> Result<Response, ApiError> {
    let issues = validate_playbook(&request.dsl);
    if !validation_errors(&issues).is_empty() {
        return Ok((StatusCode::UNPROCESSABLE_ENTITY, Json(issues)).into_response());
    }
    let playbook_id = PlaybookId::new(playbook_id);
    let previous_active = state.playbooks.get_active(&playbook_id).map_err(store_error)?;
    let versions = state.playbooks.list_versions(&playbook_id).map_err(store_error)?;
    let next_version = versions.iter().map(|version| version.version).max().unwrap_or(0) + 1;
    let activate = request.enabled != Some(false);
    let playbook = Playbook { playbook_id, version: next_version, active: activate, name: request.name, dsl: request.dsl };
    state.playbooks.put(playbook.clone()).map_err(store_error)?;
    if activate {
        if let Some(mut previous) = previous_active {
            previous.active = false;
            state.playbooks.put(previous).map_err(store_error)?;
        }
    }
    Ok((StatusCode::OK, Json(playbook)).into_response())
}

/// Body for `PATCH /playbooks/{id}/toggle`.
#[derive(Deserialize)]
pub struct TogglePlaybookRequest {
    /// Desired `active` state for the currently active version.
    pub active: bool,
}

/// `PATCH /playbooks/{id}/toggle` — enables or disables the active version.
pub async fn toggle_playbook(
    State(state): State<AppState>,
    Path(playbook_id): Path<String>,
    Json(request): Json<TogglePlaybookRequest>,
) -> Result<Json<Playbook>, ApiError> {
    let playbook_id = PlaybookId::new(playbook_id);
    let mut playbook = state.playbooks.get_active(&playbook_id).map_err(store_error)?.ok_or_else(|| not_found("playbook"))?;
    playbook.active = request.active;
    state.playbooks.put(playbook.clone()).map_err(store_error)?;
    Ok(Json(playbook))
}

/// `GET /playbooks/{id}` — the currently active version.
pub async fn get_playbook(State(state): State<AppState>, Path(playbook_id): Path<String>) -> Result<Json<Playbook>, ApiError> {
    let playbook = state
        .playbooks
        .get_active(&PlaybookId::new(playbook_id))
        .map_err(store_error)?
        .ok_or_else(|| not_found("playbook"))?;
    Ok(Json(playbook))
}

/// `GET /playbooks/{id}/versions` — every version, active or not.
pub async fn list_playbook_versions(State(state): State<AppState>, Path(playbook_id): Path<String>) -> Result<Json<Vec<Playbook>>, ApiError> {
    let versions = state.playbooks.list_versions(&PlaybookId::new(playbook_id)).map_err(store_error)?;
    Ok(Json(versions))
}

// ----------------------------------------------------------------------
// Triggers
// ----------------------------------------------------------------------

/// Body for `POST /triggers`.
#[derive(Deserialize)]
pub struct TriggerRequest {
    /// Webhook this trigger binds to, 1:1.
    pub webhook_id: String,
    /// Playbook to start on match.
    pub playbook_id: String,
    /// ALL or ANY match semantics.
    pub match_mode: soar_logic::MatchMode,
    /// The ordered condition list.
    pub conditions: Vec<soar_core::model::Condition>,
    /// Whether the trigger is live on creation. Defaults to `true`.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// `POST /triggers` — binds a webhook to a playbook.
pub async fn create_trigger(State(state): State<AppState>, Json(request): Json<TriggerRequest>) -> Result<Json<Trigger>, ApiError> {
    let trigger = Trigger {
        trigger_id: TriggerId::new(format!("T-{}", uuid_like())),
        webhook_id: WebhookId::new(request.webhook_id),
        playbook_id: PlaybookId::new(request.playbook_id),
        match_mode: request.match_mode,
        conditions: request.conditions,
        enabled: request.enabled,
    };
    state.triggers.put(trigger.clone()).map_err(store_error)?;
    Ok(Json(trigger))
}

/// `GET /triggers/{id}`.
pub async fn get_trigger(State(state): State<AppState>, Path(trigger_id): Path<String>) -> Result<Json<Trigger>, ApiError> {
    let trigger = state.triggers.get(&TriggerId::new(trigger_id)).map_err(store_error)?.ok_or_else(|| not_found("trigger"))?;
    Ok(Json(trigger))
}

/// Body for `PATCH /triggers/{id}/toggle`.
#[derive(Deserialize)]
pub struct ToggleTriggerRequest {
    /// Desired `enabled` state.
    pub enabled: bool,
}

/// `PATCH /triggers/{id}/toggle` — flips whether the trigger fires on match,
/// without touching its webhook binding or condition list.
pub async fn toggle_trigger(
    State(state): State<AppState>,
    Path(trigger_id): Path<String>,
    Json(request): Json<ToggleTriggerRequest>,
) -> Result<Json<Trigger>, ApiError> {
    let trigger_id = TriggerId::new(trigger_id);
    let mut trigger = state.triggers.get(&trigger_id).map_err(store_error)?.ok_or_else(|| not_found("trigger"))?;
    trigger.enabled = request.enabled;
    state.triggers.put(trigger.clone()).map_err(store_error)?;
    Ok(Json(trigger))
}

// ----------------------------------------------------------------------
// Executions
// ----------------------------------------------------------------------

/// Query filters for `GET /executions`.
#[derive(Deserialize, Default)]
pub struct ListExecutionsQuery {
    /// Restrict to one playbook.
    pub playbook_id: Option<String>,
}

/// `GET /executions` — every still-open execution, per `ExecutionStore`
/// (there is no store query over terminal executions; see DESIGN.md).
pub async fn list_executions(
    State(state): State<AppState>,
    axum::extract::Query(query): axum::extract::Query<ListExecutionsQuery>,
) -> Result<Json<Vec<Execution>>, ApiError> {
    let mut executions = state.executions.list_open().map_err(store_error)?;
    if let Some(playbook_id) = query.playbook_id {
        executions.retain(|execution| execution.playbook_id.as_str() == playbook_id);
    }
    Ok(Json(executions))
}

/// `GET /executions/{id}`.
pub async fn get_execution(State(state): State<AppState>, Path(execution_id): Path<String>) -> Result<Json<Execution>, ApiError> {
    let execution = state.executions.get(&ExecutionId::new(execution_id)).map_err(store_error)?.ok_or_else(|| not_found("execution"))?;
    Ok(Json(execution))
}

/// Body for `POST /executions`, a manual (non-webhook) start.
#[derive(Deserialize)]
pub struct CreateExecutionRequest {
    /// Playbook to start.
    pub playbook_id: String,
    /// Initial context, resolved by enrichment/condition steps.
    #[serde(default)]
    pub context: Value,
}

#[derive(Serialize)]
struct ExecutionIdBody {
    execution_id: String,
}

/// `POST /executions` — starts the active version of a playbook directly.
pub async fn create_execution(State(state): State<AppState>, Json(request): Json<CreateExecutionRequest>) -> Result<Response, ApiError> {
    let engine = Arc::clone(&state.engine);
    let playbook_id = PlaybookId::new(request.playbook_id);
    let execution_id = tokio::task::spawn_blocking(move || engine.start_execution(&playbook_id, None, request.context))
        .await
        .map_err(|err| ApiError(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))??;
    Ok((StatusCode::CREATED, Json(ExecutionIdBody { execution_id: execution_id.to_string() })).into_response())
}

/// `PATCH /executions/{id}/cancel`.
pub async fn cancel_execution(State(state): State<AppState>, Path(execution_id): Path<String>) -> Result<StatusCode, ApiError> {
    let execution_id = ExecutionId::new(execution_id);
    let lock = state.execution_lock(execution_id.as_str());
    let _guard = lock.lock().await;
    let engine = Arc::clone(&state.engine);
    let cancel_id = execution_id.clone();
    tokio::task::spawn_blocking(move || engine.cancel_execution(&cancel_id))
        .await
        .map_err(|err| ApiError(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))??;
    Ok(StatusCode::NO_CONTENT)
}

// ----------------------------------------------------------------------
// Approvals
// ----------------------------------------------------------------------

/// `GET /approvals` — every pending approval.
pub async fn list_pending_approvals(State(state): State<AppState>) -> Result<Json<Vec<Approval>>, ApiError> {
    let approvals = state.approvals.list_pending().map_err(store_error)?;
    Ok(Json(approvals))
}

/// `GET /approvals/{id}`.
pub async fn get_approval(State(state): State<AppState>, Path(approval_id): Path<String>) -> Result<Json<Approval>, ApiError> {
    let approval = state.approvals.get(&ApprovalId::new(approval_id)).map_err(store_error)?.ok_or_else(|| not_found("approval"))?;
    Ok(Json(approval))
}

/// Body for `POST /approvals/{id}/approve` and `.../reject`.
#[derive(Deserialize, Default)]
pub struct ApprovalDecisionRequest {
    /// Identity of the human deciding, if known.
    pub decided_by: Option<String>,
}

async fn resume(state: &AppState, approval_id: &str, decision: ApprovalDecision, decided_by: Option<String>) -> Result<StatusCode, ApiError> {
    let approval_id = ApprovalId::new(approval_id);
    let approval = state.approvals.get(&approval_id).map_err(store_error)?.ok_or_else(|| not_found("approval"))?;
    let lock = state.execution_lock(approval.execution_id.as_str());
    let _guard = lock.lock().await;
    let engine = Arc::clone(&state.engine);
    let resume_id = approval_id.clone();
    tokio::task::spawn_blocking(move || engine.resume_approval(&resume_id, decision, decided_by))
        .await
        .map_err(|err| ApiError(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))??;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /approvals/{id}/approve`.
pub async fn approve_approval(
    State(state): State<AppState>,
    Path(approval_id): Path<String>,
    Json(request): Json<ApprovalDecisionRequest>,
) -> Result<StatusCode, ApiError> {
    resume(&state, &approval_id, ApprovalDecision::Approved, request.decided_by).await
}

/// `POST /approvals/{id}/reject`.
pub async fn reject_approval(
    State(state): State<AppState>,
    Path(approval_id): Path<String>,
    Json(request): Json<ApprovalDecisionRequest>,
) -> Result<StatusCode, ApiError> {
    resume(&state, &approval_id, ApprovalDecision::Rejected, request.decided_by).await
}

// ----------------------------------------------------------------------
// Connectors
// ----------------------------------------------------------------------

/// Body for `POST /connectors`.
#[derive(Deserialize)]
pub struct ConnectorRequest {
    /// Connector type tag, e.g. `"http"`.
    #[serde(rename = "type")]
    pub connector_type: String,
    /// Human-readable name.
    pub name: String,
    /// Opaque, connector-type-specific configuration.
    pub config: Value,
}

/// `POST /connectors` — records are write-once for the running registry
/// (§5); the change takes effect on the next process start, not immediately.
pub async fn create_connector(State(state): State<AppState>, Json(request): Json<ConnectorRequest>) -> Result<Json<ConnectorRecord>, ApiError> {
    let connector = ConnectorRecord {
        connector_id: ConnectorId::new(format!("C-{}", uuid_like())),
        connector_type: request.connector_type,
        name: request.name,
        active: true,
        config: request.config,
    };
    state.connectors.put(connector.clone()).map_err(store_error)?;
    Ok(Json(connector))
}

/// `GET /connectors/{id}`.
pub async fn get_connector(State(state): State<AppState>, Path(connector_id): Path<String>) -> Result<Json<ConnectorRecord>, ApiError> {
    let connector = state.connectors.get(&ConnectorId::new(connector_id)).map_err(store_error)?.ok_or_else(|| not_found("connector"))?;
    Ok(Json(connector))
}

/// `GET /connectors`.
pub async fn list_connectors(State(state): State<AppState>) -> Result<Json<Vec<ConnectorRecord>>, ApiError> {
    let connectors = state.connectors.list().map_err(store_error)?;
    Ok(Json(connectors))
}

#[derive(Serialize)]
struct ConnectorTestResult {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'static str>,
}

/// Optional body for `POST /connectors/{id}/test` (§6). When supplied,
/// dispatches a real `execute(action, parameters)` call instead of the
/// default health-check `ping`.
#[derive(Deserialize)]
pub struct TestConnectorRequest {
    /// The connector action to invoke.
    pub action: String,
    /// Parameters passed through to the connector unchanged.
    #[serde(default)]
    pub parameters: Value,
}

/// `POST /connectors/{id}/test` — builds the concrete implementation from
/// the stored record and, absent a body, issues a synthetic `ping` health
/// check; with a `{action, parameters}` body, issues that real call instead.
/// Independent of the running engine's (write-once) registry.
pub async fn test_connector(
    State(state): State<AppState>,
    Path(connector_id): Path<String>,
    body: axum::body::Bytes,
) -> Result<Json<ConnectorTestResult>, ApiError> {
    let connector_id = ConnectorId::new(connector_id);
    let record = state.connectors.get(&connector_id).map_err(store_error)?.ok_or_else(|| not_found("connector"))?;
    let dispatch: Option<TestConnectorRequest> = if body.is_empty() {
        None
    } else {
        serde_json::from_slice(&body).map_err(|err| ApiError(StatusCode::BAD_REQUEST, err.to_string()))?
    };
    let result = tokio::task::spawn_blocking(move || {
        let (registry, failures) = connector_registry::build_registry(std::slice::from_ref(&record));
        if let Some((_, err)) = failures.into_iter().next() {
            return ConnectorTestResult { ok: false, error: Some(err.code()) };
        }
        match registry.resolve(record.connector_id.as_str()) {
            Ok(entry) => {
                let default_parameters = Value::Object(serde_json::Map::new());
                let (action, parameters): (&str, &Value) = match &dispatch {
                    Some(request) => (request.action.as_str(), &request.parameters),
                    None => ("ping", &default_parameters),
                };
                match entry.implementation.execute(action, parameters, std::time::Duration::from_secs(10)) {
                    Ok(_) => ConnectorTestResult { ok: true, error: None },
                    Err(err) => ConnectorTestResult { ok: false, error: Some(err.code()) },
                }
            }
            Err(err) => ConnectorTestResult { ok: false, error: Some(err.code()) },
        }
    })
    .await
    .map_err(|err| ApiError(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;
    Ok(Json(result))
}

// ----------------------------------------------------------------------
// Webhooks
// ----------------------------------------------------------------------

/// Body for `POST /webhooks`.
#[derive(Deserialize)]
pub struct CreateWebhookRequest {
    /// Whether a missing/mismatched signature rejects the request.
    #[serde(default = "default_true")]
    pub require_hmac: bool,
    /// Accepted clock skew, in seconds.
    pub timestamp_tolerance_seconds: Option<i64>,
    /// Per-source-IP and per-playbook rate limiting.
    pub rate_limit: Option<WebhookRateLimitConfig>,
}

const fn default_true() -> bool {
    true
}

#[derive(Serialize)]
struct WebhookCreatedBody {
    #[serde(flatten)]
    webhook: Webhook,
    /// The generated secret, returned exactly once.
    secret: String,
}

/// `POST /webhooks` — allocates a 32-byte secret, returned once; only its
/// first 8 hex characters are retained for display after this response.
pub async fn create_webhook(State(state): State<AppState>, Json(request): Json<CreateWebhookRequest>) -> Result<Json<WebhookCreatedBody>, ApiError> {
    let secret = generate_secret_hex();
    let webhook = Webhook {
        webhook_id: WebhookId::new(format!("WH-{}", uuid_like())),
        status: WebhookStatus::Active,
        secret: secret.clone(),
        require_hmac: request.require_hmac,
        timestamp_tolerance_seconds: request.timestamp_tolerance_seconds.unwrap_or(state.config.ingress.timestamp_tolerance_seconds),
        rate_limit: request.rate_limit.unwrap_or(WebhookRateLimitConfig {
            per_ip_per_minute: state.config.ingress.rate_limit.per_ip_per_minute,
            playbook_floods_per_minute: state.config.ingress.rate_limit.playbook_floods_per_minute,
        }),
        stats: soar_core::model::WebhookStats::default(),
    };
    state.webhooks.put(webhook.clone()).map_err(store_error)?;
    Ok(Json(WebhookCreatedBody { webhook, secret }))
}

/// `GET /webhooks/{id}`. The secret is never echoed back after creation.
pub async fn get_webhook(State(state): State<AppState>, Path(webhook_id): Path<String>) -> Result<Json<Webhook>, ApiError> {
    let mut webhook = state.webhooks.get(&WebhookId::new(webhook_id)).map_err(store_error)?.ok_or_else(|| not_found("webhook"))?;
    webhook.secret = redact_secret(&webhook.secret);
    Ok(Json(webhook))
}

/// `GET /webhooks`.
pub async fn list_webhooks(State(state): State<AppState>) -> Result<Json<Vec<Webhook>>, ApiError> {
    let mut webhooks = state.webhooks.list().map_err(store_error)?;
    for webhook in &mut webhooks {
        webhook.secret = redact_secret(&webhook.secret);
    }
    Ok(Json(webhooks))
}

#[derive(Serialize)]
struct RotatedSecretBody {
    secret: String,
}

/// `POST /webhooks/{id}/rotate-secret`.
pub async fn rotate_webhook_secret(State(state): State<AppState>, Path(webhook_id): Path<String>) -> Result<Json<RotatedSecretBody>, ApiError> {
    let webhook_id = WebhookId::new(webhook_id);
    let mut webhook = state.webhooks.get(&webhook_id).map_err(store_error)?.ok_or_else(|| not_found("webhook"))?;
    let secret = generate_secret_hex();
    webhook.secret = secret.clone();
    state.webhooks.put(webhook).map_err(store_error)?;
    record_audit(&state, None, AuditAction::ExecutionTerminated, serde_json::json!({"webhook_id": webhook_id.to_string(), "event": "secret_rotated"}));
    Ok(Json(RotatedSecretBody { secret }))
}

/// Body for `PATCH /webhooks/{id}/status`.
#[derive(Deserialize)]
pub struct WebhookStatusRequest {
    /// New lifecycle status.
    pub status: WebhookStatus,
}

/// `PATCH /webhooks/{id}/status` — suspend, disable, or re-activate.
pub async fn set_webhook_status(
    State(state): State<AppState>,
    Path(webhook_id): Path<String>,
    Json(request): Json<WebhookStatusRequest>,
) -> Result<Json<Webhook>, ApiError> {
    let mut webhook = state.webhooks.get(&WebhookId::new(webhook_id)).map_err(store_error)?.ok_or_else(|| not_found("webhook"))?;
    webhook.status = request.status;
    state.webhooks.put(webhook.clone()).map_err(store_error)?;
    webhook.secret = redact_secret(&webhook.secret);
    Ok(Json(webhook))
}

fn redact_secret(secret: &str) -> String {
    format!("{}…", secret.get(0..8).unwrap_or(secret))
}

fn generate_secret_hex() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|byte| format!("{byte:02x}")).collect::<String>()
}

fn record_audit(state: &AppState, execution_id: Option<ExecutionId>, action: AuditAction, detail: Value) {
    let _ = state.audit.append(AuditEvent {
        audit_id: soar_core::identifiers::AuditId::new(format!("AUD-{}", time::OffsetDateTime::now_utc().unix_timestamp_nanos())),
        execution_id,
        action,
        detail,
        occurred_at: time::OffsetDateTime::now_utc(),
    });
}

/// Returns a time-sortable, collision-resistant suffix for generated ids.
/// Not a real UUID; this workspace has no runtime need for RFC 4122 shape.
fn uuid_like() -> String {
    let mut suffix = [0u8; 8];
    OsRng.fill_bytes(&mut suffix);
    let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos();
    format!("{nanos:x}-{}", suffix.iter().map(|byte| format!("{byte:02x}")).collect::<String>())
}

/// Health and readiness.
pub mod health {
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::Json;
    use serde::Serialize;

    use crate::state::AppState;

    #[derive(Serialize)]
    struct Health {
        status: &'static str,
        executions_open: u64,
        approvals_pending: u64,
    }

    /// `GET /healthz` — process is alive; always 200 once bound.
    pub async fn liveness() -> StatusCode {
        StatusCode::OK
    }

    /// `GET /readyz` — the entity store is reachable.
    pub async fn readiness(State(state): State<AppState>) -> Result<Json<Health>, StatusCode> {
        let open = state.executions.list_open().map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
        let pending = state.approvals.list_pending().map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
        Ok(Json(Health {
            status: "ready",
            executions_open: u64::try_from(open.len()).unwrap_or(u64::MAX),
            approvals_pending: u64::try_from(pending.len()).unwrap_or(u64::MAX),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_secret_keeps_only_the_display_prefix() {
        let secret = "abcdef0123456789";
        assert_eq!(redact_secret(secret), "abcdef01…");
    }

    #[test]
    fn generated_secrets_are_sixty_four_hex_chars() {
        let secret = generate_secret_hex();
        assert_eq!(secret.len(), 64);
        assert!(secret.chars().all(|ch| ch.is_ascii_hexdigit()));
    }
}
