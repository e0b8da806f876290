// crates/soar-core/src/model/trigger.rs
// ============================================================================
// Module: Trigger Record
// Description: The condition list bound to a webhook (§3.3, §4.3).
// Purpose: Model the ordered, closed-operator condition list the evaluator reads.
// Dependencies: serde, serde_json, soar-logic
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use soar_logic::MatchMode;

use crate::identifiers::PlaybookId;
use crate::identifiers::TriggerId;
use crate::identifiers::WebhookId;

/// A trigger binds a webhook to the playbook it should start (§3.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    /// Trigger identifier.
    pub trigger_id: TriggerId,
    /// Webhook this trigger is bound to, 1:1.
    pub webhook_id: WebhookId,
    /// Playbook to start when the conditions match.
    pub playbook_id: PlaybookId,
    /// Whether all conditions or any condition must hold.
    pub match_mode: MatchMode,
    /// The ordered condition list, evaluated left to right.
    pub conditions: Vec<Condition>,
    /// Whether this trigger is live. A disabled trigger's webhook still
    /// accepts and validates requests, but never starts an execution.
    #[serde(default = "default_trigger_enabled")]
    pub enabled: bool,
}

fn default_trigger_enabled() -> bool {
    true
}

/// A single field comparison (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    /// Dotted path into the normalized alert, e.g. `alert.severity`.
    pub field: String,
    /// Comparison operator.
    pub operator: Operator,
    /// Operand; ignored by `exists`/`not_exists`.
    #[serde(default)]
    pub value: Value,
}

/// The closed comparison operator set (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Scalar equality after numeric/temporal normalization.
    Equals,
    /// Negation of `Equals`.
    NotEquals,
    /// Greater than, numeric or temporal.
    Gt,
    /// Greater than or equal, numeric or temporal.
    Gte,
    /// Less than, numeric or temporal.
    Lt,
    /// Less than or equal, numeric or temporal.
    Lte,
    /// Substring containment for strings.
    Contains,
    /// Negation of `Contains`.
    NotContains,
    /// String prefix match.
    StartsWith,
    /// String suffix match.
    EndsWith,
    /// Field value is a member of the operand array.
    In,
    /// Negation of `In`.
    NotIn,
    /// Field array contains the operand value.
    ArrayContains,
    /// Field array contains any value in the operand array.
    ArrayContainsAny,
    /// Field is present (and resolvable) in the alert.
    Exists,
    /// Field is absent from the alert.
    NotExists,
}
