//! Per-run mutual-exclusion lock (spec.md §4.5/§9 — at most one worker may
//! process a given run at a time).
//!
//! Grounded on the `SET key val NX EX ttl` / Lua-guarded-delete pattern in
//! `other_examples/02b0cdc1_eddndev-agentic`'s flow engine lock, generalised
//! to a token-owned lock so a holder can never release a lock it no longer
//! owns after its TTL has already expired and been reclaimed by someone else.

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::error::QueueError;

/// Deletes the key only if its value still matches the caller's token.
/// Without this guard, a worker whose TTL expired mid-execution could
/// delete a lock a different worker has since acquired.
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Extends the TTL only if the caller still holds the lock.
const RENEW_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("PEXPIRE", KEYS[1], ARGV[2])
else
    return 0
end
"#;

#[derive(Clone)]
pub struct LockManager {
    conn: ConnectionManager,
}

/// A held lock. Carries the token needed to release or renew it; dropping
/// this without calling `release` just leaves the lock to expire on its TTL.
pub struct RunLock {
    pub key: String,
    pub token: Uuid,
}

impl LockManager {
    pub async fn connect(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }

    fn lock_key(run_id: Uuid) -> String {
        format!("lock:run:{run_id}")
    }

    /// Attempt to acquire the lock for `run_id`. Returns `None` if another
    /// worker currently holds it.
    #[instrument(skip(self))]
    pub async fn acquire(&self, run_id: Uuid, ttl_ms: i64) -> Result<Option<RunLock>, QueueError> {
        let mut conn = self.conn.clone();
        let key = Self::lock_key(run_id);
        let token = Uuid::new_v4();

        let acquired: bool = redis::cmd("SET")
            .arg(&key)
            .arg(token.to_string())
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .map(|v: Option<String>| v.is_some())?;

        if acquired {
            Ok(Some(RunLock { key, token }))
        } else {
            Ok(None)
        }
    }

    /// Release a held lock. No-op (and logged) if the lock already expired
    /// and was reclaimed by another worker.
    #[instrument(skip(self, lock))]
    pub async fn release(&self, lock: &RunLock) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let released: i64 = Script::new(RELEASE_SCRIPT)
            .key(&lock.key)
            .arg(lock.token.to_string())
            .invoke_async(&mut conn)
            .await?;

        if released == 0 {
            warn!(key = %lock.key, "lock release no-op: no longer held by this token");
        }
        Ok(())
    }

    /// Extend a held lock's TTL. Returns `false` if the lock was lost.
    pub async fn renew(&self, lock: &RunLock, ttl_ms: i64) -> Result<bool, QueueError> {
        let mut conn = self.conn.clone();
        let renewed: i64 = Script::new(RENEW_SCRIPT)
            .key(&lock.key)
            .arg(lock.token.to_string())
            .arg(ttl_ms)
            .invoke_async(&mut conn)
            .await?;
        Ok(renewed != 0)
    }

    /// Raw existence check, used by admin/debug tooling rather than the hot
    /// path (which should rely on `acquire`'s own atomicity).
    pub async fn is_locked(&self, run_id: Uuid) -> Result<bool, QueueError> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(Self::lock_key(run_id)).await?;
        Ok(exists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_key_is_namespaced_per_run() {
        let run_id = Uuid::new_v4();
        assert_eq!(LockManager::lock_key(run_id), format!("lock:run:{run_id}"));
    }

    #[test]
    fn release_script_only_deletes_matching_token() {
        // Guards against the release script's logic regressing to an
        // unconditional DEL; the script text itself is the contract here
        // since it runs inside Redis, not this process.
        assert!(RELEASE_SCRIPT.contains("redis.call(\"GET\", KEYS[1]) == ARGV[1]"));
        assert!(RELEASE_SCRIPT.contains("redis.call(\"DEL\""));
    }

    #[test]
    fn renew_script_extends_ttl_only_if_owned() {
        assert!(RENEW_SCRIPT.contains("redis.call(\"GET\", KEYS[1]) == ARGV[1]"));
        assert!(RENEW_SCRIPT.contains("PEXPIRE"));
    }
}
