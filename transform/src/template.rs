//! Jinja2-like text templating (spec §4.G `template` engine), using
//! `minijinja` the way the corpus reaches for templating needs it cannot
//! satisfy with hand-rolled string substitution.

use minijinja::value::Value as MiniValue;
use minijinja::Environment;
use serde_json::Value;

use crate::error::{TransformError, TransformResult};

fn to_mini_context(value: &Value, context: &Value) -> MiniValue {
    let mut map = match context {
        Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    map.insert("value".to_string(), value.clone());
    MiniValue::from_serialize(&Value::Object(map))
}

/// Renders `expression` as a minijinja template string, binding `value`
/// plus every top-level field of `context` (typically `inputs`, `outputs`,
/// `loop_vars`) as template variables. A rendered string that parses as
/// JSON is returned structured rather than as a bare string (spec §4.G:
/// "string results that look like JSON are parsed back into structured
/// values").
pub fn render(expression: &str, value: &Value, context: &Value) -> TransformResult<Value> {
    let env = Environment::new();
    let ctx = to_mini_context(value, context);
    let rendered = env
        .render_str(expression, ctx)
        .map_err(|e| TransformError::Template {
            expr: expression.to_string(),
            reason: e.to_string(),
        })?;
    Ok(match serde_json::from_str::<Value>(&rendered) {
        Ok(parsed) if looks_like_json(&rendered) => parsed,
        _ => Value::String(rendered),
    })
}

fn looks_like_json(s: &str) -> bool {
    let trimmed = s.trim();
    trimmed.starts_with('{')
        || trimmed.starts_with('[')
        || trimmed.parse::<f64>().is_ok()
        || trimmed == "true"
        || trimmed == "false"
        || trimmed == "null"
}

/// Resolves a single `{{ … }}`-wrapped placeholder inside an otherwise
/// literal string (spec §4.H argument resolution falls through to this for
/// anything not matching the `$inputs.`/`$loop.`/`@step.` grammars when the
/// node also declares a template `parameter_transform`).
pub fn render_inline(template_str: &str, context: &Value) -> TransformResult<Value> {
    render(template_str, &Value::Null, context)
}

/// Evaluates a minijinja expression (the inner text of a `{{ … }}`
/// condition) and returns its truthiness (spec §4.G condition shape 1).
pub fn eval_expression_truthy(expression: &str, context: &Value) -> TransformResult<bool> {
    let env = Environment::new();
    let ctx = match context {
        Value::Object(map) => MiniValue::from_serialize(&Value::Object(map.clone())),
        other => MiniValue::from_serialize(other),
    };
    let compiled = env
        .compile_expression(expression)
        .map_err(|e| TransformError::Template {
            expr: expression.to_string(),
            reason: e.to_string(),
        })?;
    let result = compiled
        .eval(ctx)
        .map_err(|e| TransformError::Template {
            expr: expression.to_string(),
            reason: e.to_string(),
        })?;
    Ok(result.is_true())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_plain_field_substitution() {
        let ctx = serde_json::json!({"inputs": {"name": "world"}});
        let rendered = render("hello {{ inputs.name }}", &Value::Null, &ctx).unwrap();
        assert_eq!(rendered, serde_json::json!("hello world"));
    }

    #[test]
    fn renders_numeric_looking_output_as_number() {
        let ctx = serde_json::json!({"inputs": {"x": 2, "y": 3}});
        let rendered = render("{{ inputs.x + inputs.y }}", &Value::Null, &ctx).unwrap();
        assert_eq!(rendered, serde_json::json!(5));
    }

    #[test]
    fn expression_truthiness() {
        let ctx = serde_json::json!({"inputs": {"mode": "fast"}});
        assert!(eval_expression_truthy("inputs.mode == 'fast'", &ctx).unwrap());
    }
}
