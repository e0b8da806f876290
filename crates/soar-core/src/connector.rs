// crates/soar-core/src/connector.rs
// ============================================================================
// Module: Connector Contract
// Description: Connector trait, input schema, and normalized error set (§4.5).
// Purpose: Let the engine invoke named third-party adapters uniformly.
// Dependencies: serde_json, thiserror
// ============================================================================

//! ## Overview
//! Every connector implements [`Connector::execute`]. Concrete adapters (an
//! HTTP-backed connector, a stub/mock connector for tests) live in
//! `soar-connectors`; this crate only defines the contract, the per-action
//! input schema enforcement, and the closed error-normalization set so the
//! engine's retry policy can be written once against a stable shape.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::identifiers::ConnectorId;

/// Primitive input field types a connector action schema may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Any JSON string.
    String,
    /// A string that must parse as a dotted IPv4 address.
    StringIp,
    /// A JSON number.
    Number,
    /// A JSON boolean.
    Boolean,
    /// A JSON array.
    Array,
}

/// Declared input contract for one `(connector, action_type)` pair.
#[derive(Debug, Clone, Default)]
pub struct ActionSchema {
    /// Fields that must be present.
    pub required_fields: Vec<String>,
    /// Fields that may be present.
    pub optional_fields: Vec<String>,
    /// Declared type for each field named above.
    pub field_types: BTreeMap<String, FieldType>,
}

impl ActionSchema {
    /// Validates `inputs` against this schema.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::InvalidInput`] when a required field is
    /// missing or a declared field has the wrong JSON shape.
    pub fn validate(&self, inputs: &Value) -> Result<(), ConnectorError> {
        let Value::Object(map) = inputs else {
            return Err(ConnectorError::InvalidInput("inputs must be a JSON object".to_string()));
        };
        for field in &self.required_fields {
            if !map.contains_key(field) {
                return Err(ConnectorError::InvalidInput(format!("missing required field: {field}")));
            }
        }
        for (field, expected_type) in &self.field_types {
            if let Some(value) = map.get(field) {
                check_field_type(field, value, *expected_type)?;
            }
        }
        Ok(())
    }
}

fn check_field_type(field: &str, value: &Value, expected: FieldType) -> Result<(), ConnectorError> {
    let ok = match expected {
        FieldType::String => value.is_string(),
        FieldType::StringIp => value.as_str().is_some_and(is_dotted_ipv4),
        FieldType::Number => value.is_number(),
        FieldType::Boolean => value.is_boolean(),
        FieldType::Array => value.is_array(),
    };
    if ok {
        Ok(())
    } else {
        Err(ConnectorError::InvalidInput(format!("field {field} does not match declared type")))
    }
}

fn is_dotted_ipv4(value: &str) -> bool {
    let parts: Vec<&str> = value.split('.').collect();
    parts.len() == 4 && parts.iter().all(|part| part.parse::<u8>().is_ok())
}

/// Normalized, closed set of connector failure codes (§4.5).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectorError {
    /// The call did not complete within its timeout. Retryable.
    #[error("connector call timed out")]
    Timeout,
    /// The underlying transport could not connect. Retryable.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    /// The remote service reported unavailability (5xx). Retryable.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// The remote service rate-limited the call (429). Retryable.
    #[error("rate limited")]
    RateLimited,
    /// The resolved inputs failed schema validation. Not retryable.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Authentication to the remote service failed (401). Not retryable.
    #[error("authentication failed")]
    AuthFailed,
    /// The remote service denied the call (403). Not retryable.
    #[error("forbidden")]
    Forbidden,
    /// The remote resource was not found (404). Not retryable.
    #[error("not found")]
    NotFound,
    /// The requested `action_type` is not implemented by this connector.
    #[error("invalid action: {0}")]
    InvalidAction(String),
    /// An unclassified internal failure. Not retryable.
    #[error("internal error: {0}")]
    Internal(String),
    /// The connector does not implement this call at all.
    #[error("not implemented")]
    NotImplemented,
    /// The connector record exists but is not active.
    #[error("connector is not active")]
    NotActive,
    /// No connector matched the given id, type, or name.
    #[error("connector not found: {0}")]
    UnknownConnector(String),
}

impl ConnectorError {
    /// Returns the stable machine-readable code string.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Timeout => "CONNECTOR_TIMEOUT",
            Self::ConnectionFailed(_) => "CONNECTION_FAILED",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::RateLimited => "RATE_LIMITED",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::AuthFailed => "AUTH_FAILED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::InvalidAction(_) => "INVALID_ACTION",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::NotImplemented => "NOT_IMPLEMENTED",
            Self::NotActive => "FORBIDDEN",
            Self::UnknownConnector(_) => "NOT_FOUND",
        }
    }

    /// Whether the engine's retry policy may retry this failure.
    #[must_use]
    pub const fn retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::ConnectionFailed(_) | Self::ServiceUnavailable(_) | Self::RateLimited
        )
    }

    /// Maps an HTTP status code to a normalized connector error, per §4.5.
    #[must_use]
    pub fn from_http_status(status: u16, body_hint: &str) -> Self {
        match status {
            401 | 403 => Self::AuthFailed,
            404 => Self::NotFound,
            429 => Self::RateLimited,
            500..=599 => Self::ServiceUnavailable(body_hint.to_string()),
            _ => Self::Internal(format!("unexpected status {status}: {body_hint}")),
        }
    }
}

/// A named adapter to an external service exposing typed actions (§4.5, §9).
pub trait Connector: Send + Sync {
    /// Returns the declared input schema for `action_type`, if known.
    fn schema(&self, action_type: &str) -> Option<ActionSchema>;

    /// Executes `action_type` with `inputs`, bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns a normalized [`ConnectorError`].
    fn execute(&self, action_type: &str, inputs: &Value, timeout: Duration) -> Result<Value, ConnectorError>;
}

/// Process-wide registry of connector implementations, resolved by id, then
/// by connector `type`, then by name (§4.5 lookup order). Write-once at
/// startup, read-only afterward (§5).
pub struct ConnectorRegistry {
    by_id: BTreeMap<ConnectorId, ConnectorEntry>,
}

/// One registered connector and the metadata the invoker consults.
pub struct ConnectorEntry {
    /// Connector type tag (e.g. `"http"`).
    pub connector_type: String,
    /// Human-readable name, usable as an alternate lookup key.
    pub name: String,
    /// Whether the connector record is currently active.
    pub active: bool,
    /// The concrete implementation.
    pub implementation: std::sync::Arc<dyn Connector>,
}

impl ConnectorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { by_id: BTreeMap::new() }
    }

    /// Registers a connector under `id`.
    pub fn register(&mut self, id: ConnectorId, entry: ConnectorEntry) {
        self.by_id.insert(id, entry);
    }

    /// Resolves a connector by id, falling back to type, then name.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::UnknownConnector`] when nothing matches, or
    /// [`ConnectorError::NotActive`] when the match exists but is disabled.
    pub fn resolve(&self, reference: &str) -> Result<&ConnectorEntry, ConnectorError> {
        let entry = self
            .by_id
            .get(&ConnectorId::new(reference))
            .or_else(|| self.by_id.values().find(|entry| entry.connector_type == reference))
            .or_else(|| self.by_id.values().find(|entry| entry.name == reference))
            .ok_or_else(|| ConnectorError::UnknownConnector(reference.to_string()))?;
        if !entry.active {
            return Err(ConnectorError::NotActive);
        }
        Ok(entry)
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
