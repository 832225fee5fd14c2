//! Observable events for formguard
//!
//! Events are explicit and typed. The string form is stable and is what
//! log consumers match on.

use std::fmt;

use tracing::Level;

/// Observable events in a validation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    /// Engine configuration loaded
    ConfigLoaded,

    // Form source
    /// Form definition loaded from a source
    FormLoaded,
    /// Form definition could not be loaded
    FormLoadFailed,

    // Validation pass
    /// Validation pass begins
    ValidationBegin,
    /// Validation pass accepted the submission
    ValidationComplete,
    /// Validation pass rejected the submission
    ValidationRejected,
    /// Validation pass cancelled by the caller
    ValidationCancelled,

    // Uniqueness
    /// Store lookup issued for a unique field
    UniqueLookup,
    /// Conflicting stored submission found
    UniqueConflict,

    // Rules
    /// Scripted or logic rule failed to evaluate
    RuleEvaluationFailed,
    /// Pattern constraint could not be compiled
    PatternInvalid,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            // Configuration
            Event::ConfigLoaded => "CONFIG_LOADED",

            // Form source
            Event::FormLoaded => "FORM_LOADED",
            Event::FormLoadFailed => "FORM_LOAD_FAILED",

            // Validation pass
            Event::ValidationBegin => "VALIDATION_BEGIN",
            Event::ValidationComplete => "VALIDATION_COMPLETE",
            Event::ValidationRejected => "VALIDATION_REJECTED",
            Event::ValidationCancelled => "VALIDATION_CANCELLED",

            // Uniqueness
            Event::UniqueLookup => "UNIQUE_LOOKUP",
            Event::UniqueConflict => "UNIQUE_CONFLICT",

            // Rules
            Event::RuleEvaluationFailed => "RULE_EVALUATION_FAILED",
            Event::PatternInvalid => "PATTERN_INVALID",
        }
    }

    /// Level the event is logged at
    pub fn level(&self) -> Level {
        match self {
            Event::FormLoadFailed | Event::PatternInvalid => Level::WARN,
            Event::UniqueLookup | Event::RuleEvaluationFailed => Level::DEBUG,
            _ => Level::INFO,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
