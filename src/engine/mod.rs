//! Validation orchestration
//!
//! Public entry point of the crate: [`SubmissionValidator`] ties visibility,
//! schema compilation, uniqueness lookups and structural validation into
//! one pass per submission.
//!
//! # Design Principles
//!
//! - Stateless and re-entrant; every pass builds its own schema
//! - Uniqueness lookups are the only suspending work, issued in order
//! - A uniqueness conflict rejects before any structural check runs
//! - Infrastructure failures never come with a partial document

mod config;
mod errors;
mod form_source;
mod patch;
mod validator;

pub use config::EngineConfig;
pub use errors::{
    ConfigError, ConfigResult, FormSourceError, FormSourceResult, PatchError, PatchResult, ValidationError,
    ValidationResult,
};
pub use form_source::{FormLoader, FormSource};
pub use patch::{apply_patch, parse_patch, PatchOperation};
pub use validator::{Submission, SubmissionValidator};
