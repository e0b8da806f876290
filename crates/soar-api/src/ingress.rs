// crates/soar-api/src/ingress.rs
// ============================================================================
// Module: Webhook Ingress
// Description: The ordered 8-check ingress pipeline for `POST /webhook/{id}`.
// Purpose: Defend the engine from replay, flood, and forged requests before
//          a single byte reaches the trigger evaluator (§4.1).
// Dependencies: axum, hmac, sha2, subtle, soar-core
// ============================================================================

//! Checks run in the exact order §4.1 specifies and reject at the first
//! failure. Every check increments a metric; only an *accepted* request also
//! gets an audit event, so a flood of rejected noise does not amplify the
//! audit log.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ConnectInfo;
use axum::extract::Path;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::Json;
use hmac::Hmac;
use hmac::Mac;
use serde::Serialize;
use serde_json::Value;
use sha2::Sha256;
use soar_core::error::IngressErrorCode;
use soar_core::identifiers::AuditId;
use soar_core::identifiers::WebhookId;
use soar_core::model::AuditAction;
use soar_core::model::AuditEvent;
use soar_core::model::WebhookStatus;
use soar_core::trigger::evaluate_trigger;
use subtle::ConstantTimeEq;

use crate::nonce_cache::derive_nonce;
use crate::rate_limit::Decision;
use crate::state::AppState;

const TIMESTAMP_HEADER: &str = "x-soar-timestamp";
const SIGNATURE_HEADER: &str = "x-soar-signature";
const GLOBAL_FLOOD_KEY: &str = "__global__";

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

fn error_response(status: StatusCode, code: &'static str, retry_after: Option<u64>) -> Response {
    let mut response = (status, Json(ErrorBody { code, retry_after })).into_response();
    if let Some(seconds) = retry_after {
        if let Ok(value) = axum::http::HeaderValue::from_str(&seconds.to_string()) {
            response.headers_mut().insert(axum::http::header::RETRY_AFTER, value);
        }
    }
    response
}

#[derive(Serialize)]
struct AcceptedBody {
    execution_id: String,
}

/// Handles `POST /webhook/{webhook_id}`, applying the §4.1 ordered checks.
pub async fn handle_webhook(
    State(state): State<AppState>,
    Path(webhook_id): Path<String>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let webhook_received_at = time::OffsetDateTime::now_utc();
    state.metrics.increment("webhooks_received_total", 1);

    let per_ip_limit = state.config.ingress.rate_limit.per_ip_per_minute;
    if let Decision::Limited { retry_after_secs } = state.rate_limiter.check_ip(&peer.ip().to_string(), per_ip_limit) {
        state.metrics.increment("webhooks_rejected_total", 1);
        return error_response(StatusCode::TOO_MANY_REQUESTS, IngressErrorCode::RateLimited.as_str(), Some(retry_after_secs));
    }

    if body.len() > state.config.ingress.max_body_bytes {
        state.metrics.increment("webhooks_rejected_total", 1);
        return StatusCode::PAYLOAD_TOO_LARGE.into_response();
    }

    let webhook = match state.webhooks.get(&WebhookId::new(webhook_id.clone())) {
        Ok(Some(webhook)) => webhook,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };

    let timestamp = match headers.get(TIMESTAMP_HEADER).and_then(|value| value.to_str().ok()).map(str::parse::<i64>) {
        Some(Ok(parsed)) => Some(parsed),
        Some(Err(_)) => {
            state.metrics.increment("webhooks_rejected_total", 1);
            return error_response(StatusCode::BAD_REQUEST, IngressErrorCode::TimestampSkew.as_str(), None);
        }
        None => None,
    };
    if let Some(ts) = timestamp {
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        let tolerance = webhook.timestamp_tolerance_seconds.max(0);
        if (now - ts).abs() > tolerance {
            state.metrics.increment("webhooks_rejected_total", 1);
            return error_response(StatusCode::BAD_REQUEST, IngressErrorCode::TimestampSkew.as_str(), None);
        }
    }

    let nonce = derive_nonce(&webhook_id, timestamp.unwrap_or(0), &body);
    let is_fresh = {
        #[allow(clippy::unwrap_used, reason = "poisoning here means a prior request panicked mid-check; fail open would defeat replay protection")]
        let mut cache = state.nonce_cache.lock().unwrap();
        cache.observe(nonce)
    };
    if !is_fresh {
        state.metrics.increment("webhooks_rejected_total", 1);
        return error_response(StatusCode::BAD_REQUEST, IngressErrorCode::DuplicateNonce.as_str(), None);
    }

    let signature_header = headers.get(SIGNATURE_HEADER).and_then(|value| value.to_str().ok());
    match signature_header {
        Some(signature_hex) => {
            let Some(ts) = timestamp else {
                state.metrics.increment("webhooks_rejected_total", 1);
                return error_response(StatusCode::BAD_REQUEST, IngressErrorCode::MissingTimestamp.as_str(), None);
            };
            if !verify_signature(&webhook.secret, ts, &body, signature_hex) {
                state.metrics.increment("webhooks_rejected_total", 1);
                return error_response(StatusCode::UNAUTHORIZED, IngressErrorCode::SignatureMismatch.as_str(), None);
            }
        }
        None if webhook.require_hmac => {
            state.metrics.increment("webhooks_rejected_total", 1);
            return error_response(StatusCode::UNAUTHORIZED, IngressErrorCode::SignatureMismatch.as_str(), None);
        }
        None => {}
    }

    match webhook.status {
        WebhookStatus::Active => {}
        WebhookStatus::Suspended => {
            state.metrics.increment("webhooks_rejected_total", 1);
            return error_response(StatusCode::FORBIDDEN, IngressErrorCode::WebhookDisabled.as_str(), None);
        }
        WebhookStatus::Disabled => {
            state.metrics.increment("webhooks_rejected_total", 1);
            return error_response(StatusCode::GONE, IngressErrorCode::WebhookDisabled.as_str(), None);
        }
    }

    let trigger = match state.triggers.get_by_webhook(&WebhookId::new(webhook_id.clone())) {
        Ok(trigger) => trigger,
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };

    if let Some(trigger) = &trigger {
        let floods = state.config.ingress.rate_limit.playbook_floods_per_minute;
        if let Decision::Limited { retry_after_secs } = state.rate_limiter.check_playbook(trigger.playbook_id.as_str(), floods) {
            state.metrics.increment("webhooks_rejected_total", 1);
            return error_response(StatusCode::TOO_MANY_REQUESTS, IngressErrorCode::PlaybookFloodLimit.as_str(), Some(retry_after_secs));
        }
        if let Decision::Limited { retry_after_secs } = state.rate_limiter.check_playbook(GLOBAL_FLOOD_KEY, floods.saturating_mul(8)) {
            state.metrics.increment("webhooks_rejected_total", 1);
            return error_response(StatusCode::TOO_MANY_REQUESTS, IngressErrorCode::GlobalFloodLimit.as_str(), Some(retry_after_secs));
        }
    }

    let context: Value = match serde_json::from_slice(&body) {
        Ok(value @ Value::Object(_)) => value,
        _ => {
            state.metrics.increment("webhooks_rejected_total", 1);
            return error_response(StatusCode::BAD_REQUEST, IngressErrorCode::InvalidPayload.as_str(), None);
        }
    };

    let Some(trigger) = trigger else {
        state.metrics.increment("webhooks_dropped_total", 1);
        return StatusCode::NO_CONTENT.into_response();
    };

    if !trigger.enabled || !evaluate_trigger(&trigger, &context) {
        state.metrics.increment("webhooks_dropped_total", 1);
        return StatusCode::NO_CONTENT.into_response();
    }

    let engine = Arc::clone(&state.engine);
    let playbook_id = trigger.playbook_id.clone();
    let trigger_id = trigger.trigger_id.clone();
    let result =
        tokio::task::spawn_blocking(move || engine.start_execution_at(&playbook_id, Some(trigger_id), context, Some(webhook_received_at))).await;

    match result {
        Ok(Ok(execution_id)) => {
            state.metrics.increment("webhooks_accepted_total", 1);
            let _ = state.audit.append(AuditEvent {
                audit_id: AuditId::new(format!("AUD-{}", time::OffsetDateTime::now_utc().unix_timestamp_nanos())),
                execution_id: Some(execution_id.clone()),
                action: AuditAction::WebhookAccepted,
                detail: serde_json::json!({"webhook_id": webhook_id}),
                occurred_at: time::OffsetDateTime::now_utc(),
            });
            (StatusCode::ACCEPTED, Json(AcceptedBody { execution_id: execution_id.to_string() })).into_response()
        }
        Ok(Err(_)) | Err(_) => {
            state.metrics.increment("webhooks_rejected_total", 1);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn verify_signature(secret_hex: &str, timestamp: i64, body: &[u8], signature_hex: &str) -> bool {
    let Ok(secret) = hex_decode(secret_hex) else { return false };
    let Ok(provided) = hex_decode(signature_hex) else { return false };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(&secret) else { return false };
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(body);
    let expected = mac.finalize().into_bytes();
    expected.as_slice().ct_eq(&provided).into()
}

fn hex_decode(text: &str) -> Result<Vec<u8>, ()> {
    if text.len() % 2 != 0 {
        return Err(());
    }
    (0..text.len())
        .step_by(2)
        .map(|index| u8::from_str_radix(&text[index..index + 2], 16).map_err(|_| ()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex_encode(bytes: &[u8]) -> String {
        bytes.iter().map(|byte| format!("{byte:02x}")).collect()
    }

    #[test]
    fn signature_round_trips() {
        let secret = "ab".repeat(32);
        let mut mac = Hmac::<Sha256>::new_from_slice(&hex_decode(&secret).expect("valid hex")).expect("valid key");
        mac.update(b"1700000000.");
        mac.update(b"{}");
        let signature = hex_encode(&mac.finalize().into_bytes());
        assert!(verify_signature(&secret, 1_700_000_000, b"{}", &signature));
        assert!(!verify_signature(&secret, 1_700_000_000, b"{\"tampered\":true}", &signature));
    }
}
