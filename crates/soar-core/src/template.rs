// crates/soar-core/src/template.rs
// ============================================================================
// Module: Input Template Resolution
// Description: Resolves a step's declared inputs against the execution context.
// Purpose: Turn literal/dotted-path/template-string input declarations into
//          concrete values before a step executes (§4.4.2, §9).
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! A declared input value is one of three shapes: a literal JSON value passed
//! through unchanged, a bare dotted path (`"$alert.severity"`) resolved
//! against the execution context, or a template string containing one or
//! more `{{ dotted.path }}` interpolations. Unresolved paths interpolate as
//! an empty string inside templates but resolve bare paths to JSON `null`,
//! so downstream schema validation can still distinguish "absent" from
//! "empty".

use serde_json::Value;

const PATH_PREFIX: &str = "$";
const TEMPLATE_OPEN: &str = "{{";
const TEMPLATE_CLOSE: &str = "}}";

/// Resolves a single declared input value against `context`.
#[must_use]
pub fn resolve_input(declared: &Value, context: &Value) -> Value {
    match declared {
        Value::String(text) => resolve_string(text, context),
        other => other.clone(),
    }
}

fn resolve_string(text: &str, context: &Value) -> Value {
    if let Some(path) = text.strip_prefix(PATH_PREFIX) {
        return lookup_path(context, path).cloned().unwrap_or(Value::Null);
    }
    if text.contains(TEMPLATE_OPEN) {
        return Value::String(interpolate(text, context));
    }
    Value::String(text.to_string())
}

fn interpolate(template: &str, context: &Value) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find(TEMPLATE_OPEN) {
        output.push_str(&rest[..start]);
        let after_open = &rest[start + TEMPLATE_OPEN.len()..];
        let Some(end) = after_open.find(TEMPLATE_CLOSE) else {
            output.push_str(&rest[start..]);
            return output;
        };
        let path = after_open[..end].trim();
        let value = lookup_path(context, path);
        output.push_str(&value.map(scalar_to_string).unwrap_or_default());
        rest = &after_open[end + TEMPLATE_CLOSE.len()..];
    }
    output.push_str(rest);
    output
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn lookup_path<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = context;
    for segment in path.split('.') {
        current = resolve_segment(current, segment)?;
    }
    Some(current)
}

/// Resolves one dotted-path segment, optionally suffixed with one or more
/// `[index]` array accessors (e.g. `alerts[0]`, `alerts[0][1]`).
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

/// Resolves every declared input in `declared` against `context`.
#[must_use]
pub fn resolve_inputs(
    declared: &std::collections::BTreeMap<String, Value>,
    context: &Value,
) -> std::collections::BTreeMap<String, Value> {
    declared.iter().map(|(key, value)| (key.clone(), resolve_input(value, context))).collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn literal_values_pass_through() {
        assert_eq!(resolve_input(&json!(42), &json!({})), json!(42));
    }

    #[test]
    fn bare_path_resolves_to_null_when_missing() {
        assert_eq!(resolve_input(&json!("$alert.missing"), &json!({"alert": {}})), Value::Null);
    }

    #[test]
    fn bare_path_resolves_typed_value() {
        let context = json!({"alert": {"score": 7}});
        assert_eq!(resolve_input(&json!("$alert.score"), &context), json!(7));
    }

    #[test]
    fn template_interpolates_missing_as_empty_string() {
        let context = json!({"alert": {"severity": "high"}});
        let resolved = resolve_input(&json!("severity={{ alert.severity }} note={{ alert.missing }}"), &context);
        assert_eq!(resolved, json!("severity=high note="));
    }

    #[test]
    fn bare_path_resolves_array_index_via_bracket_syntax() {
        let context = json!({"alerts": [{"ip": "1.2.3.4"}, {"ip": "5.6.7.8"}]});
        assert_eq!(resolve_input(&json!("$alerts[1].ip"), &context), json!("5.6.7.8"));
    }

    #[test]
    fn out_of_bounds_array_index_resolves_to_null() {
        let context = json!({"alerts": [{"ip": "1.2.3.4"}]});
        assert_eq!(resolve_input(&json!("$alerts[5].ip"), &context), Value::Null);
    }
}
