//! Argument resolution grammar for `args_template` leaves (spec §4.H):
//! `$inputs.<path>`, `$loop.<var>`, `@<step_id>.outputs.<path>`; anything
//! else passes through untouched. Non-string leaves recurse structurally.

use dashmap::DashMap;
use serde_json::{Map, Value};
use skillflow_transform::condition::lookup_dotted;

pub fn resolve_args(
    template: &Value,
    inputs: &Value,
    node_outputs: &DashMap<String, Value>,
    loop_vars: &Map<String, Value>,
) -> Value {
    match template {
        Value::String(s) => resolve_leaf(s, inputs, node_outputs, loop_vars),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| resolve_args(v, inputs, node_outputs, loop_vars))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_args(v, inputs, node_outputs, loop_vars)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn resolve_leaf(
    raw: &str,
    inputs: &Value,
    node_outputs: &DashMap<String, Value>,
    loop_vars: &Map<String, Value>,
) -> Value {
    if let Some(path) = raw.strip_prefix("$inputs.") {
        return lookup_dotted(inputs, path).unwrap_or_else(|| Value::String(raw.to_string()));
    }
    if let Some(var) = raw.strip_prefix("$loop.") {
        let ctx = Value::Object(loop_vars.clone());
        return lookup_dotted(&ctx, var).unwrap_or_else(|| Value::String(raw.to_string()));
    }
    if let Some(rest) = raw.strip_prefix('@') {
        if let Some((step_id, field_path)) = rest.split_once(".outputs.") {
            if let Some(output) = node_outputs.get(step_id) {
                if let Some(extracted) = lookup_dotted(&output, field_path) {
                    return extracted;
                }
            }
        }
    }
    Value::String(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_input_path() {
        let inputs = serde_json::json!({"user": {"name": "ada"}});
        let outputs = DashMap::new();
        let loop_vars = Map::new();
        let resolved = resolve_args(
            &Value::String("$inputs.user.name".to_string()),
            &inputs,
            &outputs,
            &loop_vars,
        );
        assert_eq!(resolved, serde_json::json!("ada"));
    }

    #[test]
    fn resolves_loop_var() {
        let mut loop_vars = Map::new();
        loop_vars.insert("item".to_string(), serde_json::json!("x"));
        let resolved = resolve_args(
            &Value::String("$loop.item".to_string()),
            &Value::Null,
            &DashMap::new(),
            &loop_vars,
        );
        assert_eq!(resolved, serde_json::json!("x"));
    }

    #[test]
    fn resolves_upstream_step_output() {
        let outputs = DashMap::new();
        outputs.insert("step1".to_string(), serde_json::json!({"sum": 7}));
        let resolved = resolve_args(
            &Value::String("@step1.outputs.sum".to_string()),
            &Value::Null,
            &outputs,
            &Map::new(),
        );
        assert_eq!(resolved, serde_json::json!(7));
    }

    #[test]
    fn unmatched_placeholder_passes_through() {
        let resolved = resolve_args(
            &Value::String("literal-value".to_string()),
            &Value::Null,
            &DashMap::new(),
            &Map::new(),
        );
        assert_eq!(resolved, serde_json::json!("literal-value"));
    }

    #[test]
    fn recurses_through_nested_structures() {
        let inputs = serde_json::json!({"x": 1});
        let template = serde_json::json!({"a": ["$inputs.x", "literal"]});
        let resolved = resolve_args(&template, &inputs, &DashMap::new(), &Map::new());
        assert_eq!(resolved, serde_json::json!({"a": [1, "literal"]}));
    }
}
