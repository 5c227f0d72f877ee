//! Workflow CRUD operations.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::WorkflowRow, DbError};

/// Insert a new, empty workflow.
pub async fn create_workflow(
    pool: &PgPool,
    name: &str,
    slug: &str,
    webhook_secret: Option<&str>,
    enabled: bool,
) -> Result<WorkflowRow, DbError> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    let row = sqlx::query_as!(
        WorkflowRow,
        r#"
        INSERT INTO workflows (id, name, slug, webhook_secret, enabled, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $6)
        RETURNING id, name, slug, webhook_secret, enabled, created_at, updated_at
        "#,
        id,
        name,
        slug,
        webhook_secret,
        enabled,
        now,
    )
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Fetch a single workflow by primary key.
pub async fn get_workflow(pool: &PgPool, id: Uuid) -> Result<WorkflowRow, DbError> {
    sqlx::query_as!(
        WorkflowRow,
        r#"SELECT id, name, slug, webhook_secret, enabled, created_at, updated_at
           FROM workflows WHERE id = $1"#,
        id,
    )
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Fetch a single workflow by its unique slug (webhook admission path).
pub async fn find_by_slug(pool: &PgPool, slug: &str) -> Result<Option<WorkflowRow>, DbError> {
    let row = sqlx::query_as!(
        WorkflowRow,
        r#"SELECT id, name, slug, webhook_secret, enabled, created_at, updated_at
           FROM workflows WHERE slug = $1"#,
        slug,
    )
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Return all workflows, newest first.
pub async fn list_workflows(pool: &PgPool) -> Result<Vec<WorkflowRow>, DbError> {
    let rows = sqlx::query_as!(
        WorkflowRow,
        r#"SELECT id, name, slug, webhook_secret, enabled, created_at, updated_at
           FROM workflows ORDER BY created_at DESC"#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Update the mutable fields of a workflow (name/slug/secret/enabled).
pub async fn update_workflow(
    pool: &PgPool,
    id: Uuid,
    name: &str,
    slug: &str,
    webhook_secret: Option<&str>,
    enabled: bool,
) -> Result<WorkflowRow, DbError> {
    let row = sqlx::query_as!(
        WorkflowRow,
        r#"
        UPDATE workflows
        SET name = $2, slug = $3, webhook_secret = $4, enabled = $5, updated_at = $6
        WHERE id = $1
        RETURNING id, name, slug, webhook_secret, enabled, created_at, updated_at
        "#,
        id,
        name,
        slug,
        webhook_secret,
        enabled,
        Utc::now(),
    )
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Permanently delete a workflow (and, via `ON DELETE CASCADE`, its steps,
/// runs, and step executions).
pub async fn delete_workflow(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query!("DELETE FROM workflows WHERE id = $1", id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}
