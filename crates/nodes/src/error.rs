//! Error taxonomy and backoff computation shared by every step handler and
//! by the run processor's retry decision.

use db::models::BackoffType;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which bucket a failure falls into. Only `Transient` and `Resource` are
/// retryable; everything else terminates the run on first occurrence
/// unless the step's retry policy is (unusually) configured to ignore that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    Transient,
    Resource,
    Authorization,
    NotFound,
    Validation,
    Fatal,
}

impl ErrorCategory {
    pub fn retryable(self) -> bool {
        matches!(self, Self::Transient | Self::Resource)
    }
}

/// A failure crossing a handler/processor boundary, carrying everything the
/// processor needs to decide on a retry and everything a client needs to
/// understand what happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedError {
    pub code: String,
    pub message: String,
    pub category: ErrorCategory,
    #[serde(default)]
    pub details: Value,
}

impl ClassifiedError {
    pub fn new(code: impl Into<String>, message: impl Into<String>, category: ErrorCategory) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            category,
            details: Value::Null,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn retryable(&self) -> bool {
        self.category.retryable()
    }
}

impl std::fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.code, self.category_str(), self.message)
    }
}

impl ClassifiedError {
    fn category_str(&self) -> &'static str {
        match self.category {
            ErrorCategory::Transient => "TRANSIENT",
            ErrorCategory::Resource => "RESOURCE",
            ErrorCategory::Authorization => "AUTHORIZATION",
            ErrorCategory::NotFound => "NOT_FOUND",
            ErrorCategory::Validation => "VALIDATION",
            ErrorCategory::Fatal => "FATAL",
        }
    }
}

impl std::error::Error for ClassifiedError {}

/// Classify an HTTP status code per the fixed table in spec.md §4.1.
pub fn classify_http_error(status: u16, body: Value) -> ClassifiedError {
    let category = match status {
        500..=599 | 429 => ErrorCategory::Transient,
        401 | 403 => ErrorCategory::Authorization,
        404 => ErrorCategory::NotFound,
        400..=499 => ErrorCategory::Validation,
        _ => ErrorCategory::Fatal,
    };
    ClassifiedError::new(format!("HTTP_{status}"), format!("request failed with status {status}"), category)
        .with_details(serde_json::json!({ "status": status, "body": body }))
}

/// Classify a free-form error message (connection failures, timeouts,
/// already-typed validation errors) per spec.md §4.1.
pub fn classify_error(message: &str, kind: Option<&str>) -> ClassifiedError {
    let lower = message.to_ascii_lowercase();

    if lower.contains("econnrefused")
        || lower.contains("enotfound")
        || lower.contains("etimedout")
        || lower.contains("econnreset")
        || lower.contains("socket hang up")
        || lower.contains("connection refused")
        || lower.contains("dns")
    {
        return ClassifiedError::new("NETWORK_ERROR", message, ErrorCategory::Transient);
    }

    if lower.contains("timeout") || kind == Some("TimeoutError") {
        return ClassifiedError::new("TIMEOUT", message, ErrorCategory::Transient);
    }

    if kind == Some("ZodError") || kind == Some("ValidationError") {
        return ClassifiedError::new("VALIDATION_ERROR", message, ErrorCategory::Validation);
    }

    ClassifiedError::new("UNKNOWN_ERROR", message, ErrorCategory::Fatal)
}

/// Compute the jittered backoff delay for a retry attempt (spec.md §4.1).
///
/// `attempt` is the attempt number that just failed (1-based); the result is
/// the delay before the *next* attempt.
pub fn calculate_backoff(backoff_type: BackoffType, attempt: u32, initial_ms: u64, max_ms: u64) -> u64 {
    let base = match backoff_type {
        BackoffType::Fixed => initial_ms,
        BackoffType::Linear => initial_ms.saturating_mul(attempt as u64),
        BackoffType::Exponential => initial_ms.saturating_mul(1u64 << attempt.saturating_sub(1).min(62)),
    };

    let jitter = rand::thread_rng().gen_range(0.10..=0.20);
    let jittered = (base as f64) * (1.0 + jitter);
    jittered.min(max_ms as f64).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_http_error_matches_spec_table() {
        assert_eq!(classify_http_error(500, Value::Null).category, ErrorCategory::Transient);
        assert_eq!(classify_http_error(429, Value::Null).category, ErrorCategory::Transient);
        assert_eq!(classify_http_error(401, Value::Null).category, ErrorCategory::Authorization);
        assert_eq!(classify_http_error(403, Value::Null).category, ErrorCategory::Authorization);
        assert_eq!(classify_http_error(404, Value::Null).category, ErrorCategory::NotFound);
        assert_eq!(classify_http_error(400, Value::Null).category, ErrorCategory::Validation);
        assert_eq!(classify_http_error(422, Value::Null).category, ErrorCategory::Validation);
        assert_eq!(classify_http_error(301, Value::Null).category, ErrorCategory::Fatal);
    }

    #[test]
    fn retryable_matches_category() {
        assert!(ErrorCategory::Transient.retryable());
        assert!(ErrorCategory::Resource.retryable());
        assert!(!ErrorCategory::Authorization.retryable());
        assert!(!ErrorCategory::NotFound.retryable());
        assert!(!ErrorCategory::Validation.retryable());
        assert!(!ErrorCategory::Fatal.retryable());
    }

    #[test]
    fn classify_error_detects_network_patterns() {
        assert_eq!(classify_error("connect ECONNREFUSED 127.0.0.1:80", None).code, "NETWORK_ERROR");
        assert_eq!(classify_error("socket hang up", None).code, "NETWORK_ERROR");
        assert_eq!(classify_error("request timeout exceeded", None).code, "TIMEOUT");
        assert_eq!(classify_error("bad input", Some("ZodError")).code, "VALIDATION_ERROR");
        assert_eq!(classify_error("whatever", None).code, "UNKNOWN_ERROR");
    }

    #[test]
    fn exponential_backoff_doubles_and_respects_cap() {
        for _ in 0..50 {
            let d1 = calculate_backoff(BackoffType::Exponential, 1, 100, 10_000);
            assert!((110..=120).contains(&d1), "attempt 1 delay out of range: {d1}");
            let d2 = calculate_backoff(BackoffType::Exponential, 2, 100, 10_000);
            assert!((220..=240).contains(&d2), "attempt 2 delay out of range: {d2}");
        }
    }

    #[test]
    fn backoff_cap_applies_after_jitter() {
        let d = calculate_backoff(BackoffType::Exponential, 20, 1000, 5000);
        assert_eq!(d, 5000);
    }

    #[test]
    fn fixed_backoff_ignores_attempt_number() {
        let d = calculate_backoff(BackoffType::Fixed, 5, 500, 100_000);
        assert!((550..=600).contains(&d));
    }
}
