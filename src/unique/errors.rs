//! # Uniqueness Errors

use thiserror::Error;

use crate::schema::FieldError;

/// Result type for document store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for uniqueness checks
pub type UniqueResult<T> = Result<T, UniqueCheckError>;

/// Document store errors
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Query rejected by store: {0}")]
    InvalidQuery(String),

    #[error("Internal store error: {0}")]
    Internal(String),
}

/// Why a uniqueness pass did not complete
#[derive(Debug, Clone, Error)]
pub enum UniqueCheckError {
    /// A stored submission already holds the value
    #[error("{}", .0.message)]
    Conflict(FieldError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Uniqueness check cancelled")]
    Cancelled,
}
