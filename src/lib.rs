//! formguard - Dynamic validation for form-builder submissions
//!
//! A form is a tree of typed components. Given a form and a submitted data
//! document, formguard strips the values of hidden components, checks
//! uniqueness against previously stored submissions, validates every field
//! and returns either the sanitized document or a report of every
//! violation.

pub mod component;
pub mod engine;
pub mod observability;
pub mod sandbox;
pub mod schema;
pub mod unique;
pub mod visibility;

pub use component::{ComponentNode, Form};
pub use engine::{EngineConfig, Submission, SubmissionValidator, ValidationError, ValidationResult};
pub use schema::{FieldError, RuleKind, ValidationReport};
