//! The `delay` step handler (spec.md §4.3).
//!
//! Returns immediately; the actual wait is expressed as the delay on the
//! *next* queue message (the processor reads `current.config.durationMs`
//! when the just-completed step was a delay), keeping workers free during
//! long waits.

use async_trait::async_trait;
use chrono::Utc;
use db::models::ExecutionContext;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ClassifiedError, ErrorCategory};
use crate::traits::StepHandler;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DelayConfig {
    duration_ms: i64,
}

#[derive(Default)]
pub struct DelayHandler;

impl DelayHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StepHandler for DelayHandler {
    async fn execute(&self, resolved_config: &Value, _context: &ExecutionContext) -> Result<Value, ClassifiedError> {
        let config: DelayConfig = serde_json::from_value(resolved_config.clone())
            .map_err(|e| ClassifiedError::new("INVALID_DELAY_CONFIG", e.to_string(), ErrorCategory::Validation))?;

        if config.duration_ms <= 0 {
            return Err(ClassifiedError::new(
                "INVALID_DELAY_CONFIG",
                "durationMs must be > 0",
                ErrorCategory::Validation,
            ));
        }

        let delayed_until = Utc::now() + chrono::Duration::milliseconds(config.duration_ms);
        Ok(json!({ "delayMs": config.duration_ms, "delayedUntil": delayed_until.to_rfc3339() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use db::models::TriggerData;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(TriggerData {
            method: "POST".into(),
            headers: Default::default(),
            body: Value::Null,
            query: Default::default(),
            received_at: chrono::Utc::now(),
            source_ip: None,
        })
    }

    #[tokio::test]
    async fn returns_immediately_with_delay_metadata() {
        let handler = DelayHandler::new();
        let config = json!({ "durationMs": 5000 });

        let output = handler.execute(&config, &ctx()).await.unwrap();
        assert_eq!(output["delayMs"], 5000);
        assert!(output["delayedUntil"].as_str().is_some());
    }

    #[tokio::test]
    async fn zero_duration_is_a_validation_error() {
        let handler = DelayHandler::new();
        let config = json!({ "durationMs": 0 });

        let err = handler.execute(&config, &ctx()).await.unwrap_err();
        assert!(!err.retryable());
    }
}
