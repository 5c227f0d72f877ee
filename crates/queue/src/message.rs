//! Queue message shapes (spec.md §4.2).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The two named queues the engine uses. `execute` carries http/transform/
/// delay steps and control messages; `ai` carries `ai` steps (assumed
/// heavier, given a smaller worker pool — spec.md §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
    Execute,
    Ai,
}

impl QueueName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Execute => "execute",
            Self::Ai => "ai",
        }
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A message delivered through one of the two named queues.
///
/// `CompleteRun` is reserved per spec.md §4.2 — the processor currently
/// performs run completion via direct state updates rather than a queue
/// message, but the variant is kept so a future out-of-process notifier
/// (e.g. a webhook-completion callback) has a stable wire shape to target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    StartRun {
        run_id: Uuid,
        workflow_id: Uuid,
    },
    ExecuteStep {
        run_id: Uuid,
        workflow_id: Uuid,
        step_index: i32,
        step_id: Uuid,
        attempt: i32,
    },
    CompleteRun {
        run_id: Uuid,
        status: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_name_display_matches_as_str() {
        assert_eq!(QueueName::Execute.to_string(), "execute");
        assert_eq!(QueueName::Ai.to_string(), "ai");
    }

    #[test]
    fn execute_step_round_trips_through_json() {
        let msg = Message::ExecuteStep {
            run_id: Uuid::new_v4(),
            workflow_id: Uuid::new_v4(),
            step_index: 2,
            step_id: Uuid::new_v4(),
            attempt: 1,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"ExecuteStep\""));
        let back: Message = serde_json::from_str(&json).unwrap();
        match back {
            Message::ExecuteStep { step_index, attempt, .. } => {
                assert_eq!(step_index, 2);
                assert_eq!(attempt, 1);
            }
            _ => panic!("wrong variant"),
        }
    }
}
