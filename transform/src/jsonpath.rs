//! JSONPath extraction, used to pull `export_outputs` slices out of a
//! node's result and to resolve `for`-loop collections (spec §4.G, §4.H).

use jsonpath_rust::JsonPathQuery;
use serde_json::Value;

use crate::error::{TransformError, TransformResult};

/// Evaluates `path` against `value`, returning every match. `jsonpath-rust`
/// always yields a JSON array of matches even for a single hit.
pub fn query_all(value: &Value, path: &str) -> TransformResult<Vec<Value>> {
    let result = value
        .clone()
        .path(path)
        .map_err(|reason| TransformError::InvalidJsonPath {
            expr: path.to_string(),
            reason,
        })?;
    match result {
        Value::Array(items) => Ok(items),
        other => Ok(vec![other]),
    }
}

/// Evaluates `path` and returns the first match, if any (spec §4.F/§4.H
/// `export_outputs` extraction, which names a single output value per
/// path).
pub fn query_first(value: &Value, path: &str) -> TransformResult<Option<Value>> {
    Ok(query_all(value, path)?.into_iter().next())
}

/// Truthy per spec §4.G condition shape 2: "a JSONPath starting with `$`
/// (truthy if any match)".
pub fn is_truthy_match(value: &Value, path: &str) -> TransformResult<bool> {
    Ok(!query_all(value, path)?.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_nested_field() {
        let value = serde_json::json!({"result": 5});
        let extracted = query_first(&value, "$.result").unwrap();
        assert_eq!(extracted, Some(serde_json::json!(5)));
    }

    #[test]
    fn empty_match_is_falsy() {
        let value = serde_json::json!({"other": 1});
        assert!(!is_truthy_match(&value, "$.missing").unwrap());
    }
}
