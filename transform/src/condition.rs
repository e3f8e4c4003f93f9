//! Condition evaluation for `conditional` branches and `while` loops
//! (spec §4.G, §9). Three accepted shapes:
//!
//! 1. a full template expression wrapped in `{{ … }}`;
//! 2. a JSONPath starting with `$` (truthy if any match);
//! 3. a bare comparison `<ident> <op> <literal>` against the context map.
//!
//! Per spec §9's design note, the reference implementation falls through
//! to a raw `eval()` for shape 3; this port replaces that with a small
//! whitelisted grammar — no string-to-code evaluation of any kind.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::error::{TransformError, TransformResult};
use crate::jsonpath::is_truthy_match;
use crate::template;

static BARE_COMPARISON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^\s*([A-Za-z_][A-Za-z0-9_.\[\]]*)\s*(==|!=|<=|>=|<|>)\s*(.+?)\s*$"#,
    )
    .expect("static regex is valid")
});

/// Evaluates `condition` against an ephemeral context (spec §4.G: "strictly
/// on an ephemeral context mapping; no global side effects").
pub fn evaluate_condition(condition: &str, context: &Value) -> TransformResult<bool> {
    let trimmed = condition.trim();
    if let Some(inner) = trimmed
        .strip_prefix("{{")
        .and_then(|s| s.strip_suffix("}}"))
    {
        return template::eval_expression_truthy(inner.trim(), context);
    }
    if trimmed.starts_with('$') {
        return is_truthy_match(context, trimmed);
    }
    evaluate_bare_comparison(trimmed, context)
}

fn evaluate_bare_comparison(expr: &str, context: &Value) -> TransformResult<bool> {
    let captures = BARE_COMPARISON
        .captures(expr)
        .ok_or_else(|| TransformError::InvalidCondition(expr.to_string()))?;
    let ident = &captures[1];
    let op = &captures[2];
    let literal_src = captures[3].trim();

    let left = lookup_dotted(context, ident)
        .ok_or_else(|| TransformError::UnresolvedReference(ident.to_string()))?;
    let right = parse_literal(literal_src)?;

    Ok(compare(&left, op, &right))
}

fn parse_literal(src: &str) -> TransformResult<Value> {
    if let Some(unquoted) = src
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
    {
        return Ok(Value::String(unquoted.to_string()));
    }
    serde_json::from_str(src).map_err(|_| TransformError::InvalidCondition(src.to_string()))
}

/// Resolves a dotted path (e.g. `inputs.mode`) against a JSON object
/// context. Array indices (`items.0`) are supported for completeness.
pub fn lookup_dotted(context: &Value, path: &str) -> Option<Value> {
    let mut current = context;
    for segment in path.split('.') {
        match current {
            Value::Object(map) => current = map.get(segment)?,
            Value::Array(items) => {
                let idx: usize = segment.parse().ok()?;
                current = items.get(idx)?;
            }
            _ => return None,
        }
    }
    Some(current.clone())
}

fn compare(left: &Value, op: &str, right: &Value) -> bool {
    match op {
        "==" => left == right,
        "!=" => left != right,
        _ => {
            let (Some(l), Some(r)) = (as_f64(left), as_f64(right)) else {
                return false;
            };
            match op {
                "<" => l < r,
                "<=" => l <= r,
                ">" => l > r,
                ">=" => l >= r,
                _ => false,
            }
        }
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    value.as_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_string_equality() {
        let ctx = serde_json::json!({"inputs": {"mode": "fast"}});
        assert!(evaluate_condition("inputs.mode == 'fast'", &ctx).unwrap());
        assert!(!evaluate_condition("inputs.mode == 'slow'", &ctx).unwrap());
    }

    #[test]
    fn numeric_comparison() {
        let ctx = serde_json::json!({"loop_vars": {"index": 3}});
        assert!(evaluate_condition("loop_vars.index < 5", &ctx).unwrap());
        assert!(!evaluate_condition("loop_vars.index >= 5", &ctx).unwrap());
    }

    #[test]
    fn jsonpath_shape_is_truthy_on_any_match() {
        let ctx = serde_json::json!({"outputs": {"sum": 5}});
        assert!(evaluate_condition("$.outputs.sum", &ctx).unwrap());
        assert!(!evaluate_condition("$.outputs.missing", &ctx).unwrap());
    }

    #[test]
    fn unknown_identifier_is_an_error_not_a_silent_false() {
        let ctx = serde_json::json!({"inputs": {}});
        assert!(evaluate_condition("inputs.missing == 'x'", &ctx).is_err());
    }
}
