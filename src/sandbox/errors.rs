//! # Sandbox Errors

use thiserror::Error;

/// Result type for rule evaluation
pub type EvalResult<T> = Result<T, EvalError>;

/// Rule evaluation errors
///
/// None of these crash the caller: visibility treats them as "shown", field
/// rules treat them as a violation carrying the message.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("SyntaxError: {message} at {position}")]
    Syntax { message: String, position: usize },

    #[error("{0}")]
    Runtime(String),

    #[error("Script execution timed out after {0}ms")]
    Timeout(u64),

    #[error("Script exceeded the step limit of {0}")]
    StepLimit(u64),

    #[error("Script exceeds size limit: {actual} bytes (max {max})")]
    TooLarge { max: usize, actual: usize },

    #[error("Expression nesting exceeds limit of {0}")]
    TooDeep(usize),

    #[error("Unrecognized operation {0}")]
    UnknownOperation(String),
}

impl EvalError {
    pub fn syntax(message: impl Into<String>, position: usize) -> Self {
        EvalError::Syntax {
            message: message.into(),
            position,
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        EvalError::Runtime(message.into())
    }

    /// Whether the evaluation was cut off by a resource bound.
    pub fn is_budget_exceeded(&self) -> bool {
        matches!(self, EvalError::Timeout(_) | EvalError::StepLimit(_))
    }
}
