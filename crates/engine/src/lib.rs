//! `engine` crate — the run processor (C7): the queue-driven state machine
//! that advances a run through its enabled steps.

pub mod config;
pub mod error;
pub mod processor;

pub use config::ProcessorConfig;
pub use error::EngineError;
pub use processor::{ExecuteStepMsg, RunProcessor};
