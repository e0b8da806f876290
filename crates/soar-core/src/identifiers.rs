// crates/soar-core/src/identifiers.rs
// ============================================================================
// Module: SOAR Identifiers
// Description: Canonical opaque identifiers for playbooks, webhooks, and runs.
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! This module defines the canonical string-based identifiers used throughout
//! the engine. Identifiers are opaque and serialize as strings. Validation of
//! identifier shape (e.g. the `PB-` prefix) is handled at the playbook and
//! webhook boundaries, not within these simple wrappers.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

macro_rules! string_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from any string-like value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

string_id!(PlaybookId, "Immutable logical playbook identifier (`PB-[A-Z0-9_-]+`).");
string_id!(WebhookId, "Webhook identifier (`WH-<base36>`).");
string_id!(TriggerId, "Trigger identifier, bound 1:1 with a webhook.");
string_id!(ExecutionId, "Time-ordered, sortable execution identifier.");
string_id!(StepId, "Step identifier, unique within a playbook version.");
string_id!(ApprovalId, "Approval identifier.");
string_id!(ConnectorId, "Connector identifier.");
string_id!(SlaPolicyId, "SLA policy identifier.");
string_id!(AuditId, "Audit event identifier.");
