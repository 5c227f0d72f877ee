//! The run processor (C7) — the queue-driven state machine that advances a
//! run through its enabled steps (spec.md §4.5).

use db::models::{ExecutionContext, RunError, RunStatus, StepRow, StepType};
use db::DbPool;
use nodes::{ClassifiedError, ErrorCategory, Registry};
use queue::{LockManager, Message, Queue, QueueName};
use serde_json::Value;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::ProcessorConfig;
use crate::error::EngineError;

/// The `ExecuteStep` message shape, lifted out of `queue::Message` so the
/// processor's API doesn't force callers to match on every variant.
#[derive(Debug, Clone)]
pub struct ExecuteStepMsg {
    pub run_id: Uuid,
    pub workflow_id: Uuid,
    pub step_index: i32,
    pub step_id: Uuid,
    pub attempt: i32,
}

pub struct RunProcessor {
    pool: DbPool,
    queue: Queue,
    locks: LockManager,
    registry: Registry,
    config: ProcessorConfig,
}

fn queue_for_step_type(step_type: StepType) -> QueueName {
    match step_type {
        StepType::Ai => QueueName::Ai,
        _ => QueueName::Execute,
    }
}

/// The retry decision depends only on `retryable ∧ attempt < maxAttempts`
/// (spec.md §4.5(b)(2)(j), §7).
fn should_retry(error: &ClassifiedError, attempt: i32, max_attempts: u32) -> bool {
    error.retryable() && attempt < max_attempts as i32
}

impl RunProcessor {
    pub fn new(pool: DbPool, queue: Queue, locks: LockManager, registry: Registry, config: ProcessorConfig) -> Self {
        Self { pool, queue, locks, registry, config }
    }

    /// `onStartRun(runId, workflowId)` (spec.md §4.5a).
    #[instrument(skip(self))]
    pub async fn on_start_run(&self, run_id: Uuid, workflow_id: Uuid) -> Result<(), EngineError> {
        let _workflow = db::repository::workflows::get_workflow(&self.pool, workflow_id).await?;
        let _run = db::repository::runs::get_run(&self.pool, run_id).await?;

        db::repository::runs::set_status(&self.pool, run_id, RunStatus::Running.to_string().as_str()).await?;

        let enabled_steps = db::repository::steps::list_enabled_steps(&self.pool, workflow_id).await?;

        if enabled_steps.is_empty() {
            db::repository::runs::complete(&self.pool, run_id, RunStatus::Completed.to_string().as_str(), None).await?;
            info!(%run_id, "run has no enabled steps, completed immediately");
            return Ok(());
        }

        let first = &enabled_steps[0];
        let step_type = first.parsed_type().map_err(|_| EngineError::HandlerNotFound(first.step_type.clone()))?;

        self.queue
            .enqueue(
                queue_for_step_type(step_type),
                &Message::ExecuteStep {
                    run_id,
                    workflow_id,
                    step_index: 0,
                    step_id: first.id,
                    attempt: 1,
                },
                0,
            )
            .await?;

        Ok(())
    }

    /// `onExecuteStep(msg)` (spec.md §4.5b). `source_queue` is the queue the
    /// worker dequeued this message from — needed only to re-enqueue onto
    /// the same queue when the run lock can't be acquired.
    #[instrument(skip(self, msg))]
    pub async fn on_execute_step(&self, msg: ExecuteStepMsg, source_queue: QueueName) -> Result<(), EngineError> {
        let lock = match self.locks.acquire(msg.run_id, self.config.lock_ttl_ms).await? {
            Some(lock) => lock,
            None => {
                self.queue
                    .reenqueue_with_delay(
                        source_queue,
                        &Message::ExecuteStep {
                            run_id: msg.run_id,
                            workflow_id: msg.workflow_id,
                            step_index: msg.step_index,
                            step_id: msg.step_id,
                            attempt: msg.attempt,
                        },
                        self.config.lock_retry_delay_ms,
                    )
                    .await?;
                return Ok(());
            }
        };

        let outcome = self.process_locked(&msg).await;

        if let Err(e) = self.locks.release(&lock).await {
            warn!(%e, "failed to release run lock");
        }

        outcome
    }

    async fn process_locked(&self, msg: &ExecuteStepMsg) -> Result<(), EngineError> {
        let workflow = db::repository::workflows::get_workflow(&self.pool, msg.workflow_id).await?;
        let run = db::repository::runs::get_run(&self.pool, msg.run_id).await?;

        if run.parsed_status() != RunStatus::Running {
            return Ok(());
        }
        if run.current_step_index != msg.step_index {
            return Ok(());
        }

        let enabled_steps = db::repository::steps::list_enabled_steps(&self.pool, workflow.id).await?;
        let Some(step) = enabled_steps.iter().find(|s| s.id == msg.step_id) else {
            return self
                .terminal_fail(msg.run_id, "STEP_NOT_FOUND", "step not found among enabled steps", Value::Null, Some(msg.step_id), None)
                .await;
        };

        let step_type = match step.parsed_type() {
            Ok(t) => t,
            Err(_) => {
                return self
                    .terminal_fail(msg.run_id, "UNKNOWN_STEP_TYPE", format!("unknown step type `{}`", step.step_type), Value::Null, Some(step.id), Some(step.name.clone()))
                    .await
            }
        };

        let Some(handler) = self.registry.get(&step_type.to_string()) else {
            return self
                .terminal_fail(msg.run_id, "HANDLER_NOT_FOUND", format!("no handler registered for step type `{step_type}`"), Value::Null, Some(step.id), Some(step.name.clone()))
                .await;
        };

        let context = run.parsed_context()?;

        let resolved_input = expr::resolve_expressions(&step.config, &context.to_json());

        let exec_row = db::repository::step_executions::create_pending(
            &self.pool, msg.run_id, step.id, &step.name, msg.attempt, resolved_input.clone(),
        )
        .await?;
        db::repository::step_executions::mark_running(&self.pool, exec_row.id).await?;

        let timeout_ms = step
            .timeout_ms
            .map(|v| v as u64)
            .unwrap_or(self.config.default_step_timeout_ms)
            .min(self.config.max_step_timeout_ms);

        let started = std::time::Instant::now();
        let result = tokio::time::timeout(
            std::time::Duration::from_millis(timeout_ms),
            handler.execute(&resolved_input, &context),
        )
        .await;

        let duration_ms = started.elapsed().as_millis() as i32;

        let classified = match result {
            Ok(Ok(output)) => {
                if serde_json::to_vec(&output).map(|v| v.len()).unwrap_or(usize::MAX) > self.config.max_step_output_bytes {
                    Err(ClassifiedError::new("OUTPUT_TOO_LARGE", "step output exceeds the configured size limit", ErrorCategory::Validation))
                } else {
                    Ok(output)
                }
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ClassifiedError::new("TIMEOUT", "step execution exceeded its deadline", ErrorCategory::Transient)),
        };

        match classified {
            Ok(output) => {
                self.handle_success(msg, &workflow.id, step, &enabled_steps, &context, &resolved_input, output, exec_row.id, duration_ms).await
            }
            Err(error) => {
                self.handle_failure(msg, step, error, exec_row.id, duration_ms).await
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_success(
        &self,
        msg: &ExecuteStepMsg,
        workflow_id: &Uuid,
        step: &StepRow,
        enabled_steps: &[StepRow],
        context: &ExecutionContext,
        resolved_input: &Value,
        output: Value,
        exec_id: Uuid,
        duration_ms: i32,
    ) -> Result<(), EngineError> {
        let new_context = context.with_step_output(&step.name, output.clone());
        let new_context_json = new_context.to_json();

        if serde_json::to_vec(&new_context_json).map(|v| v.len()).unwrap_or(usize::MAX) > self.config.max_context_size_bytes {
            let error = ClassifiedError::new("CONTEXT_TOO_LARGE", "run context exceeds the configured size limit", ErrorCategory::Validation);
            return self.handle_failure(msg, step, error, exec_id, duration_ms).await;
        }

        db::repository::step_executions::mark_completed(&self.pool, exec_id, output, duration_ms).await?;

        let next_index = msg.step_index + 1;

        if (next_index as usize) < enabled_steps.len() {
            db::repository::runs::advance_step(&self.pool, msg.run_id, next_index, new_context_json).await?;

            let next_step = &enabled_steps[next_index as usize];
            let next_type = next_step.parsed_type().unwrap_or(StepType::Http);

            let delay = if step.parsed_type() == Ok(StepType::Delay) {
                resolved_input.get("durationMs").and_then(|v| v.as_i64()).unwrap_or(0)
            } else {
                0
            };

            self.queue
                .enqueue(
                    queue_for_step_type(next_type),
                    &Message::ExecuteStep {
                        run_id: msg.run_id,
                        workflow_id: *workflow_id,
                        step_index: next_index,
                        step_id: next_step.id,
                        attempt: 1,
                    },
                    delay,
                )
                .await?;
        } else {
            db::repository::runs::advance_step(&self.pool, msg.run_id, next_index, new_context_json).await?;
            db::repository::runs::complete(&self.pool, msg.run_id, RunStatus::Completed.to_string().as_str(), None).await?;
        }

        Ok(())
    }

    async fn handle_failure(
        &self,
        msg: &ExecuteStepMsg,
        step: &StepRow,
        error: ClassifiedError,
        exec_id: Uuid,
        duration_ms: i32,
    ) -> Result<(), EngineError> {
        let error_json = serde_json::to_value(&error).unwrap_or(Value::Null);
        db::repository::step_executions::mark_failed(&self.pool, exec_id, error_json, duration_ms).await?;

        let policy = step.parsed_retry_policy();

        if should_retry(&error, msg.attempt, policy.max_attempts) {
            let delay_ms = nodes::calculate_backoff(policy.backoff_type, msg.attempt as u32, policy.initial_delay_ms, policy.max_delay_ms);

            self.queue
                .enqueue(
                    queue_for_step_type(step.parsed_type().unwrap_or(StepType::Http)),
                    &Message::ExecuteStep {
                        run_id: msg.run_id,
                        workflow_id: msg.workflow_id,
                        step_index: msg.step_index,
                        step_id: msg.step_id,
                        attempt: msg.attempt + 1,
                    },
                    delay_ms as i64,
                )
                .await?;

            Ok(())
        } else {
            self.terminal_fail(
                msg.run_id,
                &error.code,
                error.message.clone(),
                error.details.clone(),
                Some(step.id),
                Some(step.name.clone()),
            )
            .await
        }
    }

    async fn terminal_fail(
        &self,
        run_id: Uuid,
        code: &str,
        message: impl Into<String>,
        details: Value,
        step_id: Option<Uuid>,
        step_name: Option<String>,
    ) -> Result<(), EngineError> {
        let error = RunError {
            code: code.to_string(),
            message: message.into(),
            details,
            step_id,
            step_name,
        };
        let error_json = serde_json::to_value(&error).unwrap_or(Value::Null);
        db::repository::runs::complete(&self.pool, run_id, RunStatus::Failed.to_string().as_str(), Some(error_json)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ai_steps_route_to_the_ai_queue() {
        assert_eq!(queue_for_step_type(StepType::Ai), QueueName::Ai);
    }

    #[test]
    fn non_ai_steps_route_to_the_execute_queue() {
        assert_eq!(queue_for_step_type(StepType::Http), QueueName::Execute);
        assert_eq!(queue_for_step_type(StepType::Transform), QueueName::Execute);
        assert_eq!(queue_for_step_type(StepType::Delay), QueueName::Execute);
    }

    #[test]
    fn retries_while_retryable_and_under_the_attempt_budget() {
        let transient = ClassifiedError::new("TIMEOUT", "x", ErrorCategory::Transient);
        assert!(should_retry(&transient, 1, 3));
        assert!(should_retry(&transient, 2, 3));
        assert!(!should_retry(&transient, 3, 3));
    }

    #[test]
    fn non_retryable_categories_never_retry_regardless_of_budget() {
        let fatal = ClassifiedError::new("HTTP_404", "x", ErrorCategory::NotFound);
        assert!(!should_retry(&fatal, 1, 10));
    }
}
