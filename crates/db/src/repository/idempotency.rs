//! Idempotency-key repository functions.
//!
//! A key is bound to a run for 24 hours (spec.md §3). `bind` is
//! insert-if-absent so that two concurrent webhook POSTs with the same
//! key race to bind exactly one run (spec.md §8 invariant).

use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::IdempotencyKeyRow, DbError};

const TTL_HOURS: i64 = 24;

/// Look up a key, returning the bound run id iff the binding hasn't expired.
pub async fn find_active(pool: &PgPool, key: &str) -> Result<Option<Uuid>, DbError> {
    let row = sqlx::query_as!(
        IdempotencyKeyRow,
        r#"
        SELECT key, run_id, created_at, expires_at
        FROM idempotency_keys WHERE key = $1 AND expires_at > $2
        "#,
        key,
        Utc::now(),
    )
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.run_id))
}

/// Bind `key` to `run_id` if no (unexpired) binding exists yet. Returns
/// the run id actually bound — the caller's `run_id` on first bind, or
/// whatever a concurrent request already bound, on conflict.
pub async fn bind(pool: &PgPool, key: &str, run_id: Uuid) -> Result<Uuid, DbError> {
    let now = Utc::now();
    let expires_at = now + Duration::hours(TTL_HOURS);

    let row = sqlx::query_as!(
        IdempotencyKeyRow,
        r#"
        INSERT INTO idempotency_keys (key, run_id, created_at, expires_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (key) DO UPDATE SET key = idempotency_keys.key
        RETURNING key, run_id, created_at, expires_at
        "#,
        key,
        run_id,
        now,
        expires_at,
    )
    .fetch_one(pool)
    .await?;

    Ok(row.run_id)
}

/// Delete every binding whose TTL has elapsed. Run periodically (spec.md §6).
pub async fn delete_expired(pool: &PgPool) -> Result<u64, DbError> {
    let result = sqlx::query!(
        "DELETE FROM idempotency_keys WHERE expires_at < $1",
        Utc::now(),
    )
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
