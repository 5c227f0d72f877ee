//! Engine-level error types.

use thiserror::Error;

/// Errors produced by the run processor.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("workflow {0} not found")]
    WorkflowNotFound(uuid::Uuid),

    #[error("run {0} not found")]
    RunNotFound(uuid::Uuid),

    #[error("step {step_id} referenced by run {run_id} not found among enabled steps")]
    StepNotFound { run_id: uuid::Uuid, step_id: uuid::Uuid },

    #[error("no handler registered for step type '{0}'")]
    HandlerNotFound(String),

    #[error("database error: {0}")]
    Database(#[from] db::DbError),

    #[error("queue error: {0}")]
    Queue(#[from] queue::QueueError),

    #[error("stored run context failed to deserialise: {0}")]
    ContextDecode(#[from] serde_json::Error),
}
