// crates/soar-core/src/trigger.rs
// ============================================================================
// Module: Trigger Evaluator
// Description: Field resolution, operator comparisons, and tri-state wiring.
// Purpose: Decide whether a normalized alert matches a trigger's conditions (§4.3).
// Dependencies: bigdecimal, time, serde_json, soar-logic
// ============================================================================

//! ## Overview
//! Field resolution is itself tri-state: a dotted path may resolve `Found`,
//! resolve to an explicit `null`, or be entirely `Missing` (no such key at any
//! segment). `exists`/`not_exists` read that resolution outcome directly;
//! every other operator treats a missing or type-mismatched field as
//! [`TriState::Unknown`] rather than `False`, so operator failures cannot be
//! mistaken for an explicit negative match (§4.3 edge cases).

use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde_json::Value;
use soar_logic::evaluate_conditions;
use soar_logic::TriState;
use time::OffsetDateTime;

use crate::model::Condition;
use crate::model::Operator;
use crate::model::Trigger;

/// Outcome of resolving a dotted path against a JSON document.
enum Resolution<'a> {
    /// The path resolved to a concrete value (possibly JSON `null`).
    Found(&'a Value),
    /// No such path exists.
    Missing,
}

/// Resolves a dotted path (`a.b.c`), with segments optionally suffixed by
/// one or more `[index]` array accessors (`alerts[0].ip`), against `context`.
fn resolve_path<'a>(context: &'a Value, path: &str) -> Resolution<'a> {
    let mut current = context;
    for segment in path.split('.') {
        match resolve_segment(current, segment) {
            Some(next) => current = next,
            None => return Resolution::Missing,
        }
    }
    Resolution::Found(current)
}

/// Resolves one path segment, an object key or a key followed by array
/// accessors, against `current`.
fn resolve_segment<'a>(current: &'a Value, segment: &str) -> Option<&'a Value> {
    let (key, mut rest) = match segment.find('[') {
        Some(pos) => (&segment[..pos], &segment[pos..]),
        None => (segment, ""),
    };
    let mut value = if key.is_empty() { current } else { current.as_object()?.get(key)? };
    while !rest.is_empty() {
        let close = rest.find(']')?;
        let index: usize = rest[1..close].parse().ok()?;
        value = value.as_array()?.get(index)?;
        rest = &rest[close + 1..];
    }
    Some(value)
}

/// Evaluates one condition against `context`, returning a tri-state result.
#[must_use]
pub fn evaluate_condition(condition: &Condition, context: &Value) -> TriState {
    let resolution = resolve_path(context, &condition.field);
    match condition.operator {
        Operator::Exists => return TriState::from(matches!(resolution, Resolution::Found(_))),
        Operator::NotExists => return TriState::from(matches!(resolution, Resolution::Missing)),
        _ => {}
    }
    let Resolution::Found(field_value) = resolution else {
        return TriState::Unknown;
    };
    compare(condition.operator, field_value, &condition.value)
}

fn compare(operator: Operator, field_value: &Value, operand: &Value) -> TriState {
    match operator {
        Operator::Equals => TriState::from(values_equal(field_value, operand)),
        Operator::NotEquals => TriState::from(!values_equal(field_value, operand)),
        Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => compare_ordered(operator, field_value, operand),
        Operator::Contains => string_op(field_value, operand, |haystack, needle| haystack.contains(needle)),
        Operator::NotContains => string_op(field_value, operand, |haystack, needle| !haystack.contains(needle)),
        Operator::StartsWith => string_op(field_value, operand, str::starts_with),
        Operator::EndsWith => string_op(field_value, operand, str::ends_with),
        Operator::In => membership(operand, field_value),
        Operator::NotIn => match membership(operand, field_value) {
            TriState::True => TriState::False,
            TriState::False => TriState::True,
            TriState::Unknown => TriState::Unknown,
        },
        Operator::ArrayContains => array_membership(field_value, operand, false),
        Operator::ArrayContainsAny => array_membership(field_value, operand, true),
        Operator::Exists | Operator::NotExists => unreachable!("handled before comparison dispatch"),
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    if let (Some(left), Some(right)) = (as_decimal(left), as_decimal(right)) {
        return left == right;
    }
    if let (Some(left), Some(right)) = (as_timestamp(left), as_timestamp(right)) {
        return left == right;
    }
    left == right
}

fn compare_ordered(operator: Operator, field_value: &Value, operand: &Value) -> TriState {
    let ordering = if let (Some(left), Some(right)) = (as_decimal(field_value), as_decimal(operand)) {
        left.partial_cmp(&right)
    } else if let (Some(left), Some(right)) = (as_timestamp(field_value), as_timestamp(operand)) {
        left.partial_cmp(&right)
    } else {
        None
    };
    let Some(ordering) = ordering else {
        return TriState::Unknown;
    };
    let holds = match operator {
        Operator::Gt => ordering.is_gt(),
        Operator::Gte => ordering.is_ge(),
        Operator::Lt => ordering.is_lt(),
        Operator::Lte => ordering.is_le(),
        _ => unreachable!("only ordered operators reach this branch"),
    };
    TriState::from(holds)
}

fn as_decimal(value: &Value) -> Option<BigDecimal> {
    match value {
        Value::Number(number) => BigDecimal::from_str(&number.to_string()).ok(),
        Value::String(text) => BigDecimal::from_str(text).ok(),
        _ => None,
    }
}

fn as_timestamp(value: &Value) -> Option<OffsetDateTime> {
    let text = value.as_str()?;
    OffsetDateTime::parse(text, &time::format_description::well_known::Rfc3339).ok()
}

fn string_op(field_value: &Value, operand: &Value, op: impl Fn(&str, &str) -> bool) -> TriState {
    match (field_value.as_str(), operand.as_str()) {
        (Some(haystack), Some(needle)) => TriState::from(op(haystack, needle)),
        _ => TriState::Unknown,
    }
}

fn membership(operand: &Value, field_value: &Value) -> TriState {
    let Some(items) = operand.as_array() else {
        return TriState::Unknown;
    };
    TriState::from(items.iter().any(|item| values_equal(item, field_value)))
}

fn array_membership(field_value: &Value, operand: &Value, any: bool) -> TriState {
    let Some(field_items) = field_value.as_array() else {
        return TriState::Unknown;
    };
    if any {
        let Some(candidates) = operand.as_array() else {
            return TriState::Unknown;
        };
        TriState::from(candidates.iter().any(|candidate| field_items.iter().any(|item| values_equal(item, candidate))))
    } else {
        TriState::from(field_items.iter().any(|item| values_equal(item, operand)))
    }
}

/// Evaluates whether `trigger`'s condition list matches `context`, applying
/// its match mode with the standard ALL/ANY short-circuit rules (§4.3).
#[must_use]
pub fn evaluate_trigger(trigger: &Trigger, context: &Value) -> bool {
    evaluate_conditions(trigger.match_mode, trigger.conditions.len(), |index| {
        evaluate_condition(&trigger.conditions[index], context)
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use soar_logic::MatchMode;

    use super::*;
    use crate::identifiers::PlaybookId;
    use crate::identifiers::TriggerId;
    use crate::identifiers::WebhookId;

    fn condition(field: &str, operator: Operator, value: Value) -> Condition {
        Condition { field: field.to_string(), operator, value }
    }

    #[test]
    fn missing_field_is_unknown_not_false() {
        let context = json!({"alert": {}});
        let condition = condition("alert.severity", Operator::Equals, json!("high"));
        assert_eq!(evaluate_condition(&condition, &context), TriState::Unknown);
    }

    #[test]
    fn numeric_strings_compare_as_decimals() {
        let context = json!({"alert": {"score": "10.50"}});
        let condition = condition("alert.score", Operator::Gt, json!("10.0"));
        assert_eq!(evaluate_condition(&condition, &context), TriState::True);
    }

    #[test]
    fn exists_does_not_require_a_typed_comparison() {
        let context = json!({"alert": {"ip": null}});
        let condition = condition("alert.ip", Operator::Exists, Value::Null);
        assert_eq!(evaluate_condition(&condition, &context), TriState::True);
    }

    #[test]
    fn array_index_via_bracket_syntax_resolves_a_nested_element() {
        let context = json!({"alerts": [{"ip": "1.2.3.4"}, {"ip": "5.6.7.8"}]});
        let condition = condition("alerts[1].ip", Operator::Equals, json!("5.6.7.8"));
        assert_eq!(evaluate_condition(&condition, &context), TriState::True);
    }

    #[test]
    fn out_of_bounds_array_index_is_unknown() {
        let context = json!({"alerts": [{"ip": "1.2.3.4"}]});
        let condition = condition("alerts[5].ip", Operator::Equals, json!("1.2.3.4"));
        assert_eq!(evaluate_condition(&condition, &context), TriState::Unknown);
    }

    #[test]
    fn all_mode_short_circuits_on_first_false() {
        let trigger = Trigger {
            trigger_id: TriggerId::new("T-1"),
            webhook_id: WebhookId::new("WH-1"),
            playbook_id: PlaybookId::new("PB-1"),
            match_mode: MatchMode::All,
            conditions: vec![
                condition("alert.severity", Operator::Equals, json!("low")),
                condition("alert.missing", Operator::Equals, json!("x")),
            ],
            enabled: true,
        };
        assert!(!evaluate_trigger(&trigger, &json!({"alert": {"severity": "high"}})));
    }
}
