//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models — they carry no business logic.  The
//! `engine` crate holds the behaviour that interprets them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// workflows
// ---------------------------------------------------------------------------

/// A persisted workflow row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowRow {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub webhook_secret: Option<String>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// steps
// ---------------------------------------------------------------------------

/// The four step kinds a workflow can be built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Http,
    Transform,
    Ai,
    Delay,
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Http => "http",
            Self::Transform => "transform",
            Self::Ai => "ai",
            Self::Delay => "delay",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for StepType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(Self::Http),
            "transform" => Ok(Self::Transform),
            "ai" => Ok(Self::Ai),
            "delay" => Ok(Self::Delay),
            other => Err(format!("unknown step type: {other}")),
        }
    }
}

/// Backoff curve used between retry attempts of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffType {
    Fixed,
    Linear,
    Exponential,
}

impl Default for BackoffType {
    fn default() -> Self {
        Self::Exponential
    }
}

/// Per-step retry policy. Defaults match spec.md §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_type: BackoffType,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_type: BackoffType::Exponential,
            initial_delay_ms: 1000,
            max_delay_ms: 60_000,
        }
    }
}

/// A persisted step row.
///
/// `config`/`retry_policy` are opaque JSON columns; the shape of `config`
/// is discriminated by `step_type` (spec.md §6).
#[derive(Debug, Clone, FromRow)]
pub struct StepRow {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub order_index: i32,
    pub name: String,
    pub step_type: String,
    pub config: serde_json::Value,
    pub retry_policy: Option<serde_json::Value>,
    pub timeout_ms: Option<i32>,
    pub enabled: bool,
}

impl StepRow {
    pub fn parsed_type(&self) -> Result<StepType, String> {
        self.step_type.parse()
    }

    pub fn parsed_retry_policy(&self) -> RetryPolicy {
        self.retry_policy
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// runs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}

/// `{method, headers, body, query, receivedAt, sourceIp?}` — captured once
/// at webhook admission time and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerData {
    pub method: String,
    pub headers: std::collections::BTreeMap<String, String>,
    pub body: serde_json::Value,
    pub query: std::collections::BTreeMap<String, String>,
    pub received_at: DateTime<Utc>,
    pub source_ip: Option<String>,
}

/// `{trigger, steps, variables}` — grows only by gaining one `steps` entry
/// per completed step (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub trigger: TriggerData,
    #[serde(default)]
    pub steps: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub variables: serde_json::Map<String, serde_json::Value>,
}

impl ExecutionContext {
    pub fn new(trigger: TriggerData) -> Self {
        Self {
            trigger,
            steps: serde_json::Map::new(),
            variables: serde_json::Map::new(),
        }
    }

    /// Returns a copy of this context with `steps[step_name]` set to `output`.
    ///
    /// Copy-on-write per spec.md §5: the processor reads, appends one key,
    /// writes; there is no shared mutable context between workers.
    pub fn with_step_output(&self, step_name: &str, output: serde_json::Value) -> Self {
        let mut next = self.clone();
        next.steps.insert(step_name.to_string(), output);
        next
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("ExecutionContext always serialises")
    }
}

/// A run's terminal error, set iff `status = failed` (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunError {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub details: serde_json::Value,
    pub step_id: Option<Uuid>,
    pub step_name: Option<String>,
}

/// A persisted run row.
#[derive(Debug, Clone, FromRow)]
pub struct RunRow {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub status: String,
    pub trigger_data: serde_json::Value,
    pub context: serde_json::Value,
    pub current_step_index: i32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<serde_json::Value>,
}

impl RunRow {
    pub fn parsed_status(&self) -> RunStatus {
        self.status.parse().unwrap_or(RunStatus::Failed)
    }

    pub fn parsed_context(&self) -> Result<ExecutionContext, serde_json::Error> {
        serde_json::from_value(self.context.clone())
    }
}

// ---------------------------------------------------------------------------
// step_executions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for StepExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// One attempt at one step within a run; uniquely keyed by
/// `(run_id, step_id, attempt)`.
#[derive(Debug, Clone, FromRow)]
pub struct StepExecutionRow {
    pub id: Uuid,
    pub run_id: Uuid,
    pub step_id: Uuid,
    pub step_name: String,
    pub status: String,
    pub attempt: i32,
    pub input: serde_json::Value,
    pub output: Option<serde_json::Value>,
    pub error: Option<serde_json::Value>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i32>,
}

// ---------------------------------------------------------------------------
// idempotency_keys
// ---------------------------------------------------------------------------

/// Binds a client-supplied idempotency key to the run it produced, for 24h.
#[derive(Debug, Clone, FromRow)]
pub struct IdempotencyKeyRow {
    pub key: String,
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
