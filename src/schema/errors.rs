//! Validation report types
//!
//! Rule kinds:
//! - required: value absent, null or empty
//! - type: wrong JSON type, or a fraction where an integer is expected
//! - length: string length bounds
//! - range: numeric bounds
//! - pattern: regex, email format or decimal precision
//! - custom: scripted rule
//! - logic: logic-tree rule
//! - unique: conflicting stored submission

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which rule a field violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    Required,
    Type,
    Length,
    Range,
    Pattern,
    Custom,
    Logic,
    Unique,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::Required => "required",
            RuleKind::Type => "type",
            RuleKind::Length => "length",
            RuleKind::Range => "range",
            RuleKind::Pattern => "pattern",
            RuleKind::Custom => "custom",
            RuleKind::Logic => "logic",
            RuleKind::Unique => "unique",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One violated rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldError {
    /// Dotted path into the data, list positions as numbers (`pets.0.name`)
    pub field_path: String,
    #[serde(rename = "ruleKind")]
    pub kind: RuleKind,
    pub message: String,
}

impl FieldError {
    pub fn new(field_path: impl Into<String>, kind: RuleKind, message: impl Into<String>) -> Self {
        Self {
            field_path: field_path.into(),
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.field_path, self.kind, self.message)
    }
}

/// Every violation found in one validation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<FieldError>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A report holding a single error.
    pub fn single(error: FieldError) -> Self {
        Self { errors: vec![error] }
    }

    pub fn push(&mut self, error: FieldError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.errors.iter()
    }

    /// Errors reported for the given path.
    pub fn for_path<'a>(&'a self, field_path: &'a str) -> impl Iterator<Item = &'a FieldError> + 'a {
        self.errors.iter().filter(move |e| e.field_path == field_path)
    }

    pub fn has_kind(&self, kind: RuleKind) -> bool {
        self.errors.iter().any(|e| e.kind == kind)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = self.errors.iter().map(|e| e.message.as_str()).collect();
        write!(f, "{}", messages.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rule_kind_names() {
        assert_eq!(RuleKind::Required.as_str(), "required");
        assert_eq!(RuleKind::Unique.to_string(), "unique");
        assert_eq!(serde_json::to_value(RuleKind::Logic).unwrap(), json!("logic"));
    }

    #[test]
    fn test_field_error_wire_format() {
        let error = FieldError::new("pets.0.name", RuleKind::Length, "\"name\" is too short");
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            json!({ "fieldPath": "pets.0.name", "ruleKind": "length", "message": "\"name\" is too short" })
        );
    }

    #[test]
    fn test_report_queries() {
        let mut report = ValidationReport::new();
        assert!(report.is_empty());
        report.push(FieldError::new("a", RuleKind::Required, "\"a\" is required"));
        report.push(FieldError::new("b", RuleKind::Range, "\"b\" must be less than 5"));

        assert_eq!(report.len(), 2);
        assert!(report.has_kind(RuleKind::Range));
        assert!(!report.has_kind(RuleKind::Unique));
        assert_eq!(report.for_path("a").count(), 1);
        assert_eq!(report.to_string(), "\"a\" is required; \"b\" must be less than 5");
    }
}
