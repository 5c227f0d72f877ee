//! Redis-backed implementation of the two named queues (spec.md §4.2).
//!
//! Two Redis keys per queue name:
//!   - `queue:{name}:ready`   — a LIST; `RPUSH` to enqueue, `LPOP`/`BLPOP`
//!                              to dequeue. Preserves per-producer FIFO
//!                              order for zero-delay enqueues.
//!   - `queue:{name}:delayed` — a ZSET keyed by delivery time (unix ms);
//!                              `promote_due` moves anything whose score
//!                              has elapsed onto the ready list.
//!
//! The broker itself never retries a failed delivery (spec.md §4.2 — "the
//! broker retries failed deliveries zero times"); once popped off the
//! ready list a message is gone, and retry/re-enqueue is entirely the
//! engine's responsibility via the `attempt` counter.

use std::time::{SystemTime, UNIX_EPOCH};

use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::QueueError;
use crate::message::{Message, QueueName};

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as i64
}

/// Wrapper stored in the delayed ZSET so that structurally-identical
/// messages delayed at the same instant don't collide as the same member.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DelayedEnvelope {
    id: Uuid,
    message: Message,
}

/// Handle onto the Redis-backed queue pair.
#[derive(Clone)]
pub struct Queue {
    client: redis::Client,
    conn: ConnectionManager,
}

impl Queue {
    /// Connect to Redis at `redis_url` and return a handle usable from any
    /// number of cloned producers/workers (`ConnectionManager` multiplexes
    /// internally and reconnects transparently). `enqueue`/`promote_due`
    /// share this connection; `dequeue` does not (see `dedicated_connection`).
    pub async fn connect(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { client, conn })
    }

    /// Open a fresh connection dedicated to one worker's blocking `BLPOP`
    /// calls. A `BLPOP` issued on the shared `ConnectionManager` would stall
    /// every other command multiplexed onto the same connection (including
    /// other workers' `BLPOP`/`promote_due` calls) until it returns, so each
    /// worker task must own a connection no one else writes to.
    pub async fn dedicated_connection(&self) -> Result<MultiplexedConnection, QueueError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    fn ready_key(queue: QueueName) -> String {
        format!("queue:{queue}:ready")
    }

    fn delayed_key(queue: QueueName) -> String {
        format!("queue:{queue}:delayed")
    }

    /// Enqueue `message` onto `queue`, deliverable no earlier than
    /// `now + delay_ms` (spec.md §4.2). `delay_ms = 0` delivers immediately
    /// and preserves enqueue order relative to other zero-delay sends.
    #[instrument(skip(self, message))]
    pub async fn enqueue(
        &self,
        queue: QueueName,
        message: &Message,
        delay_ms: i64,
    ) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();

        if delay_ms <= 0 {
            let payload = serde_json::to_string(message)?;
            conn.rpush::<_, _, ()>(Self::ready_key(queue), payload).await?;
            debug!(%queue, "enqueued (immediate)");
        } else {
            let envelope = DelayedEnvelope {
                id: Uuid::new_v4(),
                message: message.clone(),
            };
            let payload = serde_json::to_string(&envelope)?;
            let deliver_at = now_ms() + delay_ms;
            conn.zadd::<_, _, _, ()>(Self::delayed_key(queue), payload, deliver_at)
                .await?;
            debug!(%queue, delay_ms, "enqueued (delayed)");
        }

        Ok(())
    }

    /// Move any delayed message whose delivery time has elapsed onto the
    /// ready list. Workers call this once per poll cycle before dequeuing.
    #[instrument(skip(self))]
    pub async fn promote_due(&self, queue: QueueName) -> Result<usize, QueueError> {
        let mut conn = self.conn.clone();
        let delayed_key = Self::delayed_key(queue);
        let ready_key = Self::ready_key(queue);

        let due: Vec<String> = conn
            .zrangebyscore_limit(&delayed_key, 0, now_ms(), 0, 256)
            .await?;

        if due.is_empty() {
            return Ok(0);
        }

        let mut promoted = 0usize;
        for envelope_json in due {
            // ZREM first: if two workers race on promote_due, only one wins
            // the removal and actually re-enqueues the message.
            let removed: i64 = conn.zrem(&delayed_key, &envelope_json).await?;
            if removed == 0 {
                continue;
            }
            let envelope: DelayedEnvelope = serde_json::from_str(&envelope_json)?;
            let payload = serde_json::to_string(&envelope.message)?;
            conn.rpush::<_, _, ()>(&ready_key, payload).await?;
            promoted += 1;
        }

        Ok(promoted)
    }

    /// Block up to `timeout_secs` waiting for a ready message on `queue`.
    /// Returns `None` on timeout (no message arrived). Takes the caller's
    /// own dedicated connection (see `dedicated_connection`) rather than the
    /// shared `ConnectionManager`, so this worker's blocking wait can't
    /// stall any other worker's commands.
    pub async fn dequeue(
        &self,
        conn: &mut MultiplexedConnection,
        queue: QueueName,
        timeout_secs: f64,
    ) -> Result<Option<Message>, QueueError> {
        let key = Self::ready_key(queue);

        let result: Option<(String, String)> = conn.blpop(&key, timeout_secs).await?;
        match result {
            Some((_key, payload)) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    /// Re-enqueue the same message immediately, used when a worker can't
    /// claim the run lock (spec.md §4.5(b)(1)).
    pub async fn reenqueue_with_delay(
        &self,
        queue: QueueName,
        message: &Message,
        delay_ms: i64,
    ) -> Result<(), QueueError> {
        self.enqueue(queue, message, delay_ms).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_and_delayed_keys_are_namespaced_per_queue() {
        assert_eq!(Queue::ready_key(QueueName::Execute), "queue:execute:ready");
        assert_eq!(Queue::ready_key(QueueName::Ai), "queue:ai:ready");
        assert_eq!(Queue::delayed_key(QueueName::Execute), "queue:execute:delayed");
        assert_eq!(Queue::delayed_key(QueueName::Ai), "queue:ai:delayed");
    }

    #[test]
    fn delayed_envelope_round_trips_and_ids_differ() {
        let message = Message::StartRun {
            run_id: Uuid::new_v4(),
            workflow_id: Uuid::new_v4(),
        };
        let a = DelayedEnvelope { id: Uuid::new_v4(), message: message.clone() };
        let b = DelayedEnvelope { id: Uuid::new_v4(), message };
        let a_json = serde_json::to_string(&a).unwrap();
        let b_json = serde_json::to_string(&b).unwrap();
        // Same message content, different envelope ids, so they don't collide
        // as ZSET members.
        assert_ne!(a_json, b_json);

        let back: DelayedEnvelope = serde_json::from_str(&a_json).unwrap();
        assert_eq!(back.id, a.id);
    }

    #[test]
    fn now_ms_is_positive_and_monotonic_enough() {
        let t1 = now_ms();
        let t2 = now_ms();
        assert!(t1 > 0);
        assert!(t2 >= t1);
    }
}
