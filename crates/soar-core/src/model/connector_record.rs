// crates/soar-core/src/model/connector_record.rs
// ============================================================================
// Module: Connector Record
// Description: The persisted configuration row for a registered connector (§3.7).
// Purpose: Model what is stored/loaded at startup, distinct from the runtime
//          `Connector` trait implementation in `crate::connector`.
// Dependencies: serde, serde_json
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::identifiers::ConnectorId;

/// A registered connector's configuration (§3.7). Connectors are registered
/// process-wide at startup and are write-once, read-only afterward (§5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorRecord {
    /// Connector identifier.
    pub connector_id: ConnectorId,
    /// Connector type tag, e.g. `"http"`.
    #[serde(rename = "type")]
    pub connector_type: String,
    /// Human-readable name.
    pub name: String,
    /// Whether the connector accepts invocations.
    pub active: bool,
    /// Opaque, connector-type-specific configuration (base URL, auth, etc.).
    pub config: Value,
}
