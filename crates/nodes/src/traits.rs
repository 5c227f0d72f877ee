//! The `StepHandler` trait — the contract every step handler must fulfil.

use async_trait::async_trait;
use db::models::ExecutionContext;
use serde_json::Value;

use crate::error::ClassifiedError;

/// A handler executes one resolved step against the run's accumulated
/// context and returns its JSON output, or a classified failure the
/// processor can use to decide on a retry (spec.md §4.3).
#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn execute(
        &self,
        resolved_config: &Value,
        context: &ExecutionContext,
    ) -> Result<Value, ClassifiedError>;
}
