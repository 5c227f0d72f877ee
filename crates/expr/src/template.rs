//! `resolveExpressions` — walks an arbitrary JSON-shaped value, resolving
//! `{{ … }}` placeholders against the run context (spec.md §4.4).

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::builtins::eval_builtin;
use crate::transform::evaluate_transform;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{(.+?)\}\}").unwrap());
static WHOLE_STRING_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\{\{(.+)\}\}$").unwrap());

/// Resolve every `{{ … }}` placeholder reachable from `template`, recursing
/// through arrays and objects. Object key insertion order is preserved.
pub fn resolve_expressions(template: &Value, context: &Value) -> Value {
    match template {
        Value::String(s) => resolve_string(s, context),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| resolve_expressions(v, context)).collect())
        }
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, value) in map {
                out.insert(key.clone(), resolve_expressions(value, context));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

fn resolve_string(s: &str, context: &Value) -> Value {
    if let Some(caps) = WHOLE_STRING_PLACEHOLDER.captures(s) {
        let inner = caps.get(1).unwrap().as_str().trim();
        return eval_placeholder(inner, context).unwrap_or_else(|| Value::String(s.to_string()));
    }

    if !PLACEHOLDER.is_match(s) {
        return Value::String(s.to_string());
    }

    let mut result = s.to_string();
    let matches: Vec<_> = PLACEHOLDER.find_iter(s).collect();
    for m in matches.into_iter().rev() {
        let inner = m.as_str();
        let inner = &inner[2..inner.len() - 2];
        let replacement = match eval_placeholder(inner.trim(), context) {
            Some(v) => stringify(&v),
            None => m.as_str().to_string(),
        };
        result.replace_range(m.start()..m.end(), &replacement);
    }
    Value::String(result)
}

fn eval_placeholder(inner: &str, context: &Value) -> Option<Value> {
    if let Some(v) = eval_builtin(inner) {
        return Some(v);
    }
    evaluate_transform(inner, context).ok()
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> Value {
        json!({
            "trigger": {"body": {"name": "ada"}},
            "steps": {"fetch": {"body": {"value": 7}}},
            "variables": {"count": 3, "tags": ["a", "b"]},
        })
    }

    #[test]
    fn single_placeholder_preserves_raw_type() {
        let resolved = resolve_expressions(&json!("{{ steps.fetch.body.value }}"), &ctx());
        assert_eq!(resolved, json!(7));
    }

    #[test]
    fn single_placeholder_preserves_array() {
        let resolved = resolve_expressions(&json!("{{ variables.tags }}"), &ctx());
        assert_eq!(resolved, json!(["a", "b"]));
    }

    #[test]
    fn interpolated_string_stringifies_each_value() {
        let resolved = resolve_expressions(&json!("hello {{ trigger.body.name }}, count={{ variables.count }}"), &ctx());
        assert_eq!(resolved, json!("hello ada, count=3"));
    }

    #[test]
    fn interpolation_replaces_in_reverse_order_without_offset_drift() {
        let resolved = resolve_expressions(&json!("{{ variables.count }}-{{ variables.count }}-{{ variables.count }}"), &ctx());
        assert_eq!(resolved, json!("3-3-3"));
    }

    #[test]
    fn plain_string_without_placeholder_round_trips() {
        let v = json!("just a plain string");
        assert_eq!(resolve_expressions(&v, &ctx()), v);
    }

    #[test]
    fn unresolvable_placeholder_falls_back_to_verbatim_text() {
        let resolved = resolve_expressions(&json!("{{ steps.missing.value }}"), &ctx());
        assert_eq!(resolved, json!("{{ steps.missing.value }}"));
    }

    #[test]
    fn nested_object_and_array_are_recursed() {
        let template = json!({
            "a": "{{ variables.count }}",
            "b": ["{{ trigger.body.name }}", {"c": "{{ steps.fetch.body.value }}"}],
        });
        let resolved = resolve_expressions(&template, &ctx());
        assert_eq!(resolved, json!({"a": 3, "b": ["ada", {"c": 7}]}));
    }

    #[test]
    fn builtin_inside_placeholder_is_evaluated() {
        let resolved = resolve_expressions(&json!("{{ $uuid() }}"), &ctx());
        assert!(resolved.as_str().unwrap().len() == 36);
    }

    #[test]
    fn non_string_values_pass_through_untouched() {
        assert_eq!(resolve_expressions(&json!(42), &ctx()), json!(42));
        assert_eq!(resolve_expressions(&json!(null), &ctx()), json!(null));
        assert_eq!(resolve_expressions(&json!(true), &ctx()), json!(true));
    }
}
