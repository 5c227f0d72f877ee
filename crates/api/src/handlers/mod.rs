pub mod runs;
pub mod steps;
pub mod webhooks;
pub mod workflows;

pub use crate::AppState;
