//! Step-execution repository functions.
//!
//! Rows are append-only per `(run_id, step_id, attempt)` (spec.md §3
//! Ownership); the only mutations after insertion are status/output/
//! error/completed_at/duration_ms, performed by the processor that
//! created the row.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::StepExecutionRow, DbError};

/// Insert a new `pending` step execution. Fails (unique violation) if
/// `(run_id, step_id, attempt)` already exists — the processor relies on
/// this to make duplicate `ExecuteStep` delivery a no-op (spec.md §4.5(b)(2)(g)).
pub async fn create_pending(
    pool: &PgPool,
    run_id: Uuid,
    step_id: Uuid,
    step_name: &str,
    attempt: i32,
    input: serde_json::Value,
) -> Result<StepExecutionRow, DbError> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    let row = sqlx::query_as!(
        StepExecutionRow,
        r#"
        INSERT INTO step_executions (id, run_id, step_id, step_name, status, attempt, input, started_at)
        VALUES ($1, $2, $3, $4, 'pending', $5, $6, $7)
        RETURNING id, run_id, step_id, step_name, status, attempt, input, output, error, started_at, completed_at, duration_ms
        "#,
        id,
        run_id,
        step_id,
        step_name,
        attempt,
        input,
        now,
    )
    .fetch_one(pool)
    .await?;

    Ok(row)
}

pub async fn mark_running(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    sqlx::query!("UPDATE step_executions SET status = 'running' WHERE id = $1", id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn mark_completed(
    pool: &PgPool,
    id: Uuid,
    output: serde_json::Value,
    duration_ms: i32,
) -> Result<(), DbError> {
    sqlx::query!(
        r#"
        UPDATE step_executions
        SET status = 'completed', output = $2, completed_at = $3, duration_ms = $4
        WHERE id = $1
        "#,
        id,
        output,
        Utc::now(),
        duration_ms,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_failed(
    pool: &PgPool,
    id: Uuid,
    error: serde_json::Value,
    duration_ms: i32,
) -> Result<(), DbError> {
    sqlx::query!(
        r#"
        UPDATE step_executions
        SET status = 'failed', error = $2, completed_at = $3, duration_ms = $4
        WHERE id = $1
        "#,
        id,
        error,
        Utc::now(),
        duration_ms,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// All attempts of one step within one run, oldest first.
pub async fn list_for_step(
    pool: &PgPool,
    run_id: Uuid,
    step_id: Uuid,
) -> Result<Vec<StepExecutionRow>, DbError> {
    let rows = sqlx::query_as!(
        StepExecutionRow,
        r#"
        SELECT id, run_id, step_id, step_name, status, attempt, input, output, error, started_at, completed_at, duration_ms
        FROM step_executions WHERE run_id = $1 AND step_id = $2 ORDER BY attempt ASC
        "#,
        run_id,
        step_id,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Every step execution belonging to a run, in chronological order — used
/// by `GET /api/v1/runs/:id/steps`.
pub async fn list_for_run(pool: &PgPool, run_id: Uuid) -> Result<Vec<StepExecutionRow>, DbError> {
    let rows = sqlx::query_as!(
        StepExecutionRow,
        r#"
        SELECT id, run_id, step_id, step_name, status, attempt, input, output, error, started_at, completed_at, duration_ms
        FROM step_executions WHERE run_id = $1 ORDER BY started_at ASC
        "#,
        run_id,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
