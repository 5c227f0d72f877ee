//! The `transform` step handler (spec.md §4.3).

use async_trait::async_trait;
use db::models::ExecutionContext;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ClassifiedError, ErrorCategory};
use crate::traits::StepHandler;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransformConfig {
    expression: String,
    output_key: String,
}

#[derive(Default)]
pub struct TransformHandler;

impl TransformHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StepHandler for TransformHandler {
    async fn execute(&self, resolved_config: &Value, context: &ExecutionContext) -> Result<Value, ClassifiedError> {
        let config: TransformConfig = serde_json::from_value(resolved_config.clone())
            .map_err(|e| ClassifiedError::new("INVALID_TRANSFORM_CONFIG", e.to_string(), ErrorCategory::Validation))?;

        let result = expr::evaluate_transform(&config.expression, &context.to_json()).map_err(|e| {
            ClassifiedError::new("TRANSFORM_ERROR", e.to_string(), ErrorCategory::Validation)
                .with_details(json!({ "expression": config.expression }))
        })?;

        Ok(json!({ config.output_key: result }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use db::models::TriggerData;

    fn ctx_with_step(name: &str, output: Value) -> ExecutionContext {
        let trigger = TriggerData {
            method: "POST".into(),
            headers: Default::default(),
            body: Value::Null,
            query: Default::default(),
            received_at: chrono::Utc::now(),
            source_ip: None,
        };
        ExecutionContext::new(trigger).with_step_output(name, output)
    }

    #[tokio::test]
    async fn evaluates_expression_against_prior_step_output() {
        let handler = TransformHandler::new();
        let ctx = ctx_with_step("fetch", json!({"body": {"value": 7}}));
        let config = json!({ "expression": "steps.fetch.body.value", "outputKey": "v" });

        let output = handler.execute(&config, &ctx).await.unwrap();
        assert_eq!(output, json!({"v": 7}));
    }

    #[tokio::test]
    async fn compile_or_evaluate_error_becomes_validation_error() {
        let handler = TransformHandler::new();
        let ctx = ctx_with_step("fetch", json!({"body": {"value": 7}}));
        let config = json!({ "expression": "steps.missing.value", "outputKey": "v" });

        let err = handler.execute(&config, &ctx).await.unwrap_err();
        assert!(!err.retryable());
        assert_eq!(err.code, "TRANSFORM_ERROR");
        assert_eq!(err.details["expression"], "steps.missing.value");
    }
}
