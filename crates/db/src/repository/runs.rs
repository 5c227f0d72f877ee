//! Run CRUD operations.
//!
//! These functions enforce nothing beyond column shape — the invariants in
//! spec.md §3 (monotonic `current_step_index`, `completed_at` set iff
//! terminal, `error` set iff failed) are the run processor's (`engine`
//! crate) responsibility; the repository simply persists what it's told.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    models::{ExecutionContext, RunRow, TriggerData},
    DbError,
};

/// Create a new run in `pending` status. `context.trigger` is set equal to
/// `trigger_data` at creation (spec.md §3 invariant).
pub async fn create_run(
    pool: &PgPool,
    workflow_id: Uuid,
    trigger_data: TriggerData,
) -> Result<RunRow, DbError> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    let trigger_json = serde_json::to_value(&trigger_data).expect("TriggerData serialises");
    let context = ExecutionContext::new(trigger_data).to_json();

    let row = sqlx::query_as!(
        RunRow,
        r#"
        INSERT INTO runs (id, workflow_id, status, trigger_data, context, current_step_index, started_at)
        VALUES ($1, $2, 'pending', $3, $4, 0, $5)
        RETURNING id, workflow_id, status, trigger_data, context, current_step_index, started_at, completed_at, error
        "#,
        id,
        workflow_id,
        trigger_json,
        context,
        now,
    )
    .fetch_one(pool)
    .await?;

    Ok(row)
}

pub async fn get_run(pool: &PgPool, id: Uuid) -> Result<RunRow, DbError> {
    sqlx::query_as!(
        RunRow,
        r#"
        SELECT id, workflow_id, status, trigger_data, context, current_step_index, started_at, completed_at, error
        FROM runs WHERE id = $1
        "#,
        id,
    )
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

pub async fn list_runs_for_workflow(
    pool: &PgPool,
    workflow_id: Uuid,
) -> Result<Vec<RunRow>, DbError> {
    let rows = sqlx::query_as!(
        RunRow,
        r#"
        SELECT id, workflow_id, status, trigger_data, context, current_step_index, started_at, completed_at, error
        FROM runs WHERE workflow_id = $1 ORDER BY started_at DESC
        "#,
        workflow_id,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Transition `status` without touching any other field. Used by
/// `onStartRun` (spec.md §4.5a step 2).
pub async fn set_status(pool: &PgPool, id: Uuid, status: &str) -> Result<(), DbError> {
    sqlx::query!("UPDATE runs SET status = $2 WHERE id = $1", id, status)
        .execute(pool)
        .await?;
    Ok(())
}

/// Advance the run after a step succeeds: bump `current_step_index`,
/// replace `context`, keep `status = running` (spec.md §4.5(b)(2)(i)).
pub async fn advance_step(
    pool: &PgPool,
    id: Uuid,
    next_step_index: i32,
    context: serde_json::Value,
) -> Result<(), DbError> {
    sqlx::query!(
        r#"
        UPDATE runs
        SET current_step_index = $2, context = $3, status = 'running'
        WHERE id = $1
        "#,
        id,
        next_step_index,
        context,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Mark a run terminally complete/failed/cancelled.
pub async fn complete(
    pool: &PgPool,
    id: Uuid,
    status: &str,
    error: Option<serde_json::Value>,
) -> Result<(), DbError> {
    sqlx::query!(
        r#"
        UPDATE runs
        SET status = $2, completed_at = $3, error = $4
        WHERE id = $1
        "#,
        id,
        status,
        Utc::now(),
        error,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Cancel a run, but only if it's still `pending`/`running` (spec.md §5
/// Cancellation). Returns `true` if the cancellation took effect.
pub async fn cancel_if_active(pool: &PgPool, id: Uuid) -> Result<bool, DbError> {
    let result = sqlx::query!(
        r#"
        UPDATE runs
        SET status = 'cancelled', completed_at = $2
        WHERE id = $1 AND status IN ('pending', 'running')
        "#,
        id,
        Utc::now(),
    )
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}
