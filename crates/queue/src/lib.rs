//! Redis-backed queue abstraction: the two named queues (`execute`, `ai`)
//! with delayed delivery, plus the per-run lock manager.

pub mod client;
pub mod error;
pub mod lock;
pub mod message;

pub use client::Queue;
pub use error::QueueError;
pub use lock::{LockManager, RunLock};
pub use message::{Message, QueueName};
