//! Tuning knobs for the run processor (spec.md §6 configuration table).

/// Size/time limits the processor enforces while advancing a run.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Step timeout used when a step doesn't set its own `timeoutMs`.
    pub default_step_timeout_ms: u64,
    /// Hard ceiling a step's own `timeoutMs` may not exceed.
    pub max_step_timeout_ms: u64,
    /// A step's serialized JSON output larger than this becomes a
    /// VALIDATION failure (spec.md §4.5(b)(2)(i)).
    pub max_step_output_bytes: usize,
    /// The serialized run context larger than this becomes a VALIDATION
    /// failure after a step succeeds.
    pub max_context_size_bytes: usize,
    /// Run lock TTL (spec.md §5) — longer than typical handler work, short
    /// enough that a dead worker's lock expires before it jams a run.
    pub lock_ttl_ms: i64,
    /// Delay before re-enqueuing a message whose lock acquisition failed.
    pub lock_retry_delay_ms: i64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            default_step_timeout_ms: 300_000,
            max_step_timeout_ms: 1_800_000,
            max_step_output_bytes: 262_144,
            max_context_size_bytes: 1_048_576,
            lock_ttl_ms: 60_000,
            lock_retry_delay_ms: 1_000,
        }
    }
}
