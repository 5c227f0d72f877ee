//! `evaluateTransform` — a deliberately small JSONata-like subset: dotted
//! path and array-index navigation plus the shared builtins, sufficient for
//! the dataset-selection expressions transform steps actually write
//! (e.g. `steps.fetch.body.value`). Unlike `resolveExpressions`, failures
//! here propagate rather than falling back to a literal.

use serde_json::Value;

use crate::builtins::eval_builtin;
use crate::error::ExprError;

enum PathSegment {
    Key(String),
    Index(usize),
}

fn parse_path(expression: &str) -> Result<Vec<PathSegment>, ExprError> {
    let mut segments = Vec::new();

    for part in expression.split('.') {
        if part.is_empty() {
            return Err(ExprError::Compile(format!(
                "empty path segment in `{expression}`"
            )));
        }

        let bracket_pos = part.find('[');
        let (name, mut rest) = match bracket_pos {
            Some(pos) => (&part[..pos], &part[pos..]),
            None => (part, ""),
        };

        if !name.is_empty() {
            if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$') {
                return Err(ExprError::Compile(format!(
                    "invalid identifier `{name}` in `{expression}`"
                )));
            }
            segments.push(PathSegment::Key(name.to_string()));
        }

        while !rest.is_empty() {
            if !rest.starts_with('[') {
                return Err(ExprError::Compile(format!(
                    "malformed index near `{rest}` in `{expression}`"
                )));
            }
            let close = rest.find(']').ok_or_else(|| {
                ExprError::Compile(format!("unterminated index in `{expression}`"))
            })?;
            let idx_str = &rest[1..close];
            let idx: usize = idx_str.parse().map_err(|_| {
                ExprError::Compile(format!("invalid array index `{idx_str}` in `{expression}`"))
            })?;
            segments.push(PathSegment::Index(idx));
            rest = &rest[close + 1..];
        }
    }

    Ok(segments)
}

/// Compile and evaluate `expression` against `{trigger, steps, variables}`.
pub fn evaluate_transform(expression: &str, context: &Value) -> Result<Value, ExprError> {
    let expression = expression.trim();
    if expression.is_empty() {
        return Err(ExprError::Compile("expression is empty".into()));
    }

    if let Some(v) = eval_builtin(expression) {
        return Ok(v);
    }

    let segments = parse_path(expression)?;
    let mut current = context.clone();

    for segment in segments {
        current = match segment {
            PathSegment::Key(key) => current
                .as_object()
                .and_then(|obj| obj.get(&key))
                .cloned()
                .ok_or_else(|| {
                    ExprError::Evaluate(format!("no key `{key}` while evaluating `{expression}`"))
                })?,
            PathSegment::Index(idx) => current
                .as_array()
                .and_then(|arr| arr.get(idx))
                .cloned()
                .ok_or_else(|| {
                    ExprError::Evaluate(format!(
                        "index {idx} out of bounds while evaluating `{expression}`"
                    ))
                })?,
        };
    }

    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> Value {
        json!({
            "trigger": {"body": {"id": 42}},
            "steps": {
                "fetch": {"status": 200, "body": {"value": 7}},
                "list": {"items": [10, 20, 30]},
            },
            "variables": {"x": 1},
        })
    }

    #[test]
    fn resolves_nested_dotted_path() {
        let result = evaluate_transform("steps.fetch.body.value", &ctx()).unwrap();
        assert_eq!(result, json!(7));
    }

    #[test]
    fn resolves_array_index() {
        let result = evaluate_transform("steps.list.items[1]", &ctx()).unwrap();
        assert_eq!(result, json!(20));
    }

    #[test]
    fn missing_key_propagates_as_error() {
        assert!(evaluate_transform("steps.missing.value", &ctx()).is_err());
    }

    #[test]
    fn out_of_bounds_index_propagates_as_error() {
        assert!(evaluate_transform("steps.list.items[99]", &ctx()).is_err());
    }

    #[test]
    fn builtin_call_short_circuits_path_parsing() {
        let result = evaluate_transform("$timestamp()", &ctx()).unwrap();
        assert!(result.as_i64().unwrap() > 0);
    }

    #[test]
    fn empty_expression_is_a_compile_error() {
        assert!(matches!(
            evaluate_transform("   ", &ctx()),
            Err(ExprError::Compile(_))
        ));
    }
}
