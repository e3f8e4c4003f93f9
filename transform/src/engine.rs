//! Dispatch over the three parameter-transform engines (spec §4.G).

use serde_json::Value;
use skillflow_storage::model::TransformEngine;

use crate::error::TransformResult;
use crate::{jsonpath, template};

/// Applies `engine` with `expression` to rewrite `value` using `context`
/// (typically `{inputs, outputs, loop_vars}`, per spec §4.H's optional
/// `parameter_transform`).
pub fn apply(engine: TransformEngine, expression: &str, value: &Value, context: &Value) -> TransformResult<Value> {
    match engine {
        TransformEngine::None => Ok(value.clone()),
        TransformEngine::JsonPath => {
            let mut merged = match context.clone() {
                Value::Object(map) => map,
                _ => serde_json::Map::new(),
            };
            merged.insert("args".to_string(), value.clone());
            let combined = Value::Object(merged);
            match jsonpath::query_first(&combined, expression)? {
                Some(extracted) => Ok(extracted),
                None => Ok(Value::Null),
            }
        }
        TransformEngine::Template => template::render(expression, value, context),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_engine_passes_through() {
        let value = serde_json::json!({"a": 1});
        let out = apply(TransformEngine::None, "", &value, &Value::Null).unwrap();
        assert_eq!(out, value);
    }

    #[test]
    fn jsonpath_engine_extracts_from_combined_context() {
        let ctx = serde_json::json!({"inputs": {"x": 1}});
        let value = serde_json::json!({"y": 2});
        let out = apply(TransformEngine::JsonPath, "$.args.y", &value, &ctx).unwrap();
        assert_eq!(out, serde_json::json!(2));
    }
}
