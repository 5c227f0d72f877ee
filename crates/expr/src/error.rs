//! Error type for the expression evaluator.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExprError {
    #[error("expression did not compile: {0}")]
    Compile(String),

    #[error("expression evaluation failed: {0}")]
    Evaluate(String),
}
