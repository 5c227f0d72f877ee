//! Built-in functions available inside `{{ … }}` placeholders and as bare
//! transform expressions (spec.md §4.4).

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

pub fn now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

pub fn new_uuid() -> String {
    Uuid::new_v4().to_string()
}

pub fn timestamp_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Match one of the three zero-argument builtins by its literal call text.
/// Returns `None` for anything else, letting the caller fall through to
/// path evaluation.
pub fn eval_builtin(expr: &str) -> Option<Value> {
    match expr {
        "$now()" => Some(Value::String(now_iso())),
        "$uuid()" => Some(Value::String(new_uuid())),
        "$timestamp()" => Some(Value::Number(timestamp_ms().into())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_iso_has_millisecond_precision_and_zulu_suffix() {
        let s = now_iso();
        assert!(s.ends_with('Z'));
        assert_eq!(s.len(), "2024-01-01T00:00:00.000Z".len());
    }

    #[test]
    fn uuid_is_unique_across_calls() {
        assert_ne!(new_uuid(), new_uuid());
    }

    #[test]
    fn eval_builtin_recognizes_exact_call_forms_only() {
        assert!(eval_builtin("$now()").is_some());
        assert!(eval_builtin("$uuid()").is_some());
        assert!(eval_builtin("$timestamp()").is_some());
        assert!(eval_builtin("$now( )").is_none());
        assert!(eval_builtin("now()").is_none());
    }
}
