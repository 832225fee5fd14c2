//! Schema compiler and validator
//!
//! Turns a component tree into a validator tree for one pass, then runs it
//! against the sanitized submission data.
//!
//! # Design Principles
//!
//! - Built fresh per pass; nothing is cached between submissions
//! - Compilation never fails; malformed constraints are ignored
//! - Every violation is collected, validation never stops at the first
//! - Caller logic fails closed: a rule that cannot be evaluated rejects
//! - The input document is never mutated

mod compiler;
mod errors;
mod types;
mod validator;

pub use compiler::compile;
pub use errors::{FieldError, RuleKind, ValidationReport};
pub use types::{CompiledSchema, DynamicRule, FieldDef, FieldType, NumberRules, ObjectSchema};
pub use validator::SchemaValidator;
