//! Step CRUD operations.
//!
//! Steps are ordered per workflow; `(workflow_id, order_index)` and
//! `(workflow_id, name)` are each unique (spec.md §3). After a delete, the
//! surviving steps' `order_index` values are re-densified to `[0..n)` in
//! the same transaction (spec.md §3, §9 open question — resolved: always
//! densify, no exceptions).

use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::StepRow, DbError};

/// Append a new step at the end of the workflow's ordering.
pub async fn create_step(
    pool: &PgPool,
    workflow_id: Uuid,
    name: &str,
    step_type: &str,
    config: serde_json::Value,
    retry_policy: Option<serde_json::Value>,
    timeout_ms: Option<i32>,
    enabled: bool,
) -> Result<StepRow, DbError> {
    let id = Uuid::new_v4();

    let mut tx = pool.begin().await?;

    let next_order: i32 = sqlx::query_scalar!(
        r#"SELECT COALESCE(MAX(order_index), -1) + 1 FROM steps WHERE workflow_id = $1"#,
        workflow_id,
    )
    .fetch_one(&mut *tx)
    .await?
    .unwrap_or(0);

    let row = sqlx::query_as!(
        StepRow,
        r#"
        INSERT INTO steps (id, workflow_id, order_index, name, step_type, config, retry_policy, timeout_ms, enabled)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING id, workflow_id, order_index, name, step_type, config, retry_policy, timeout_ms, enabled
        "#,
        id,
        workflow_id,
        next_order,
        name,
        step_type,
        config,
        retry_policy,
        timeout_ms,
        enabled,
    )
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(row)
}

/// All steps belonging to a workflow, ordered by `order_index`.
pub async fn list_steps(pool: &PgPool, workflow_id: Uuid) -> Result<Vec<StepRow>, DbError> {
    let rows = sqlx::query_as!(
        StepRow,
        r#"
        SELECT id, workflow_id, order_index, name, step_type, config, retry_policy, timeout_ms, enabled
        FROM steps WHERE workflow_id = $1 ORDER BY order_index ASC
        "#,
        workflow_id,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Only the enabled steps of a workflow, ordered by `order_index` — the
/// sequence the run processor actually considers (spec.md §4.5, GLOSSARY).
pub async fn list_enabled_steps(pool: &PgPool, workflow_id: Uuid) -> Result<Vec<StepRow>, DbError> {
    let rows = sqlx::query_as!(
        StepRow,
        r#"
        SELECT id, workflow_id, order_index, name, step_type, config, retry_policy, timeout_ms, enabled
        FROM steps WHERE workflow_id = $1 AND enabled = true ORDER BY order_index ASC
        "#,
        workflow_id,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn get_step(pool: &PgPool, id: Uuid) -> Result<StepRow, DbError> {
    sqlx::query_as!(
        StepRow,
        r#"
        SELECT id, workflow_id, order_index, name, step_type, config, retry_policy, timeout_ms, enabled
        FROM steps WHERE id = $1
        "#,
        id,
    )
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

#[allow(clippy::too_many_arguments)]
pub async fn update_step(
    pool: &PgPool,
    id: Uuid,
    name: &str,
    config: serde_json::Value,
    retry_policy: Option<serde_json::Value>,
    timeout_ms: Option<i32>,
    enabled: bool,
) -> Result<StepRow, DbError> {
    sqlx::query_as!(
        StepRow,
        r#"
        UPDATE steps
        SET name = $2, config = $3, retry_policy = $4, timeout_ms = $5, enabled = $6
        WHERE id = $1
        RETURNING id, workflow_id, order_index, name, step_type, config, retry_policy, timeout_ms, enabled
        "#,
        id,
        name,
        config,
        retry_policy,
        timeout_ms,
        enabled,
    )
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Delete a step and re-densify the surviving steps' `order_index` to
/// `[0..n)`, preserving their relative order.
pub async fn delete_step(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    let workflow_id: Uuid = sqlx::query_scalar!(
        r#"SELECT workflow_id FROM steps WHERE id = $1"#,
        id,
    )
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(DbError::NotFound)?;

    sqlx::query!("DELETE FROM steps WHERE id = $1", id)
        .execute(&mut *tx)
        .await?;

    let remaining_ids: Vec<Uuid> = sqlx::query_scalar!(
        r#"SELECT id FROM steps WHERE workflow_id = $1 ORDER BY order_index ASC"#,
        workflow_id,
    )
    .fetch_all(&mut *tx)
    .await?;

    for (index, step_id) in remaining_ids.into_iter().enumerate() {
        sqlx::query!(
            "UPDATE steps SET order_index = $2 WHERE id = $1",
            step_id,
            index as i32,
        )
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok(())
}
