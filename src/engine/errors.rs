//! # Engine Errors
//!
//! Infrastructure failures are kept apart from validation verdicts: a
//! rejected submission carries its report, every other variant means the
//! pass could not reach a verdict.

use thiserror::Error;

use crate::schema::ValidationReport;
use crate::unique::{StoreError, UniqueCheckError};

/// Result type for validation passes
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for form lookups
pub type FormSourceResult<T> = Result<T, FormSourceError>;

/// Result type for JSON Patch application
pub type PatchResult<T> = Result<T, PatchError>;

/// Validation pass errors
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    /// The submission violates the form's rules
    #[error("Submission rejected: {0}")]
    Rejected(ValidationReport),

    #[error("Document store error: {0}")]
    Store(#[from] StoreError),

    #[error("Form source error: {0}")]
    FormSource(#[from] FormSourceError),

    #[error("Patch error: {0}")]
    Patch(#[from] PatchError),

    #[error("Validation cancelled")]
    Cancelled,
}

impl ValidationError {
    /// The report of a rejected submission
    pub fn report(&self) -> Option<&ValidationReport> {
        match self {
            ValidationError::Rejected(report) => Some(report),
            _ => None,
        }
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, ValidationError::Rejected(_))
    }
}

impl From<UniqueCheckError> for ValidationError {
    fn from(err: UniqueCheckError) -> Self {
        match err {
            UniqueCheckError::Conflict(error) => ValidationError::Rejected(ValidationReport::single(error)),
            UniqueCheckError::Store(error) => ValidationError::Store(error),
            UniqueCheckError::Cancelled => ValidationError::Cancelled,
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {message}")]
    Io { path: String, message: String },

    #[error("Invalid config JSON: {0}")]
    Parse(String),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Form source errors
#[derive(Debug, Clone, Error)]
pub enum FormSourceError {
    #[error("Form not found: {0}")]
    NotFound(String),

    #[error("Invalid form id: {0}")]
    InvalidId(String),

    #[error("Form has no id")]
    MissingId,

    #[error("Malformed form {id}: {message}")]
    Malformed { id: String, message: String },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("No form source configured")]
    NotConfigured,
}

/// JSON Patch errors
#[derive(Debug, Clone, Error)]
pub enum PatchError {
    #[error("Invalid patch document: {0}")]
    InvalidPatch(String),

    #[error("Invalid JSON pointer: {0}")]
    InvalidPointer(String),

    #[error("Path not found: {0}")]
    PathNotFound(String),

    #[error("Test failed at {0}")]
    TestFailed(String),

    #[error("Patched submission is malformed: {0}")]
    InvalidDocument(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldError, RuleKind};

    #[test]
    fn test_conflict_becomes_rejection() {
        let conflict = UniqueCheckError::Conflict(FieldError::new("ssn", RuleKind::Unique, "SSN must be unique."));
        let err = ValidationError::from(conflict);

        assert!(err.is_rejection());
        let report = err.report().unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(err.to_string(), "Submission rejected: SSN must be unique.");
    }

    #[test]
    fn test_infrastructure_errors_carry_no_report() {
        let err = ValidationError::from(UniqueCheckError::Store(StoreError::Unavailable("down".into())));
        assert!(matches!(err, ValidationError::Store(_)));
        assert!(err.report().is_none());
        assert!(matches!(ValidationError::from(UniqueCheckError::Cancelled), ValidationError::Cancelled));
    }
}
