// crates/soar-api/src/connector_registry.rs
// ============================================================================
// Module: Connector Registry Loader
// Description: Builds a `soar-core` `ConnectorRegistry` from stored records.
// Purpose: Bridge the persisted, opaque `ConnectorRecord` config JSON to the
//          concrete `soar-connectors` implementations (§3.7, §4.5, §5).
// Dependencies: soar-core, soar-connectors, serde, serde_json
// ============================================================================

//! Connectors are registered write-once at startup and re-registered
//! wholesale whenever a connector record changes, per §5's "connectors are
//! write-once, read-only afterward" note — there is no incremental update to
//! a running [`ConnectorRegistry`].

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use soar_connectors::ActionBinding;
use soar_connectors::HttpConnector;
use soar_connectors::HttpConnectorConfig;
use soar_connectors::StubConnector;
use soar_core::connector::ActionSchema;
use soar_core::connector::ConnectorEntry;
use soar_core::connector::ConnectorError;
use soar_core::connector::ConnectorRegistry;
use soar_core::model::ConnectorRecord;

#[derive(Debug, Deserialize)]
struct RawActionBinding {
    method: String,
    path_template: String,
    #[serde(default)]
    required_fields: Vec<String>,
}

/// Builds a fresh registry from every stored connector record.
///
/// Unrecognized `type` values, or records whose config fails to parse, are
/// dropped with the failure recorded by the caller rather than aborting the
/// whole registry build; a single malformed connector record should not take
/// down every other connector.
#[must_use]
pub fn build_registry(records: &[ConnectorRecord]) -> (ConnectorRegistry, Vec<(String, ConnectorError)>) {
    let mut registry = ConnectorRegistry::new();
    let mut failures = Vec::new();
    for record in records {
        match build_entry(record) {
            Ok(entry) => registry.register(record.connector_id.clone(), entry),
            Err(err) => failures.push((record.connector_id.to_string(), err)),
        }
    }
    (registry, failures)
}

fn build_entry(record: &ConnectorRecord) -> Result<ConnectorEntry, ConnectorError> {
    let implementation: Arc<dyn soar_core::connector::Connector> = match record.connector_type.as_str() {
        "http" => Arc::new(build_http_connector(record)?),
        "stub" => Arc::new(StubConnector::new()),
        other => return Err(ConnectorError::InvalidInput(format!("unsupported connector type: {other}"))),
    };
    Ok(ConnectorEntry { connector_type: record.connector_type.clone(), name: record.name.clone(), active: record.active, implementation })
}

fn build_http_connector(record: &ConnectorRecord) -> Result<HttpConnector, ConnectorError> {
    let actions_value = record.config.get("actions").cloned().unwrap_or_else(|| serde_json::json!({}));
    let raw_actions: BTreeMap<String, RawActionBinding> = serde_json::from_value(actions_value)
        .map_err(|err| ConnectorError::InvalidInput(format!("invalid actions map: {err}")))?;
    let actions = raw_actions
        .into_iter()
        .map(|(action_type, raw)| {
            let method = raw.method.parse().map_err(|_| ConnectorError::InvalidInput(format!("invalid method for action {action_type}")))?;
            Ok((
                action_type,
                ActionBinding {
                    method,
                    path_template: raw.path_template,
                    schema: ActionSchema { required_fields: raw.required_fields, ..ActionSchema::default() },
                },
            ))
        })
        .collect::<Result<BTreeMap<_, _>, ConnectorError>>()?;
    let config = HttpConnectorConfig::from_record_config(&record.config, actions)?;
    Ok(HttpConnector::new(config))
}

#[cfg(test)]
mod tests {
    use soar_core::identifiers::ConnectorId;

    use super::*;

    #[test]
    fn stub_connectors_register_cleanly() {
        let record = ConnectorRecord {
            connector_id: ConnectorId::new("stub-1"),
            connector_type: "stub".to_string(),
            name: "demo".to_string(),
            active: true,
            config: serde_json::json!({}),
        };
        let (registry, failures) = build_registry(&[record]);
        assert!(failures.is_empty());
        assert!(registry.resolve("stub-1").is_ok());
    }

    #[test]
    fn unsupported_type_is_reported_not_fatal() {
        let record = ConnectorRecord {
            connector_id: ConnectorId::new("weird-1"),
            connector_type: "carrier-pigeon".to_string(),
            name: "demo".to_string(),
            active: true,
            config: serde_json::json!({}),
        };
        let (registry, failures) = build_registry(&[record]);
        assert_eq!(failures.len(), 1);
        assert!(registry.resolve("weird-1").is_err());
    }
}
