//! Repository functions — one function per database operation.
//!
//! Every function takes a `&DbPool` and returns a `Result<T, DbError>`.
//! No business logic, no domain interpretation — pure SQL.

pub mod idempotency;
pub mod runs;
pub mod step_executions;
pub mod steps;
pub mod workflows;
