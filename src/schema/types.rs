//! Compiled schema types
//!
//! Field types:
//! - text: string, optional length bounds and email format
//! - number: numeric, numeric strings coerced
//! - any: accepted as submitted
//! - object: nested object with its own field schema
//! - rows: list of row objects sharing one field schema

use regex::Regex;
use serde_json::Value;

use crate::unique::UniquenessRegistry;

/// Numeric constraints
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumberRules {
    /// Fractions rejected
    pub integer: bool,
    /// Maximum decimal places
    pub precision: Option<usize>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub greater: Option<f64>,
    pub less: Option<f64>,
}

impl NumberRules {
    /// Derives integer and precision rules from a step such as `"1"` or
    /// `"0.01"`. `"any"` and unparseable steps add nothing.
    pub fn apply_step(&mut self, step: &str) {
        let step = step.trim();
        if step.is_empty() || step == "any" || step.parse::<f64>().is_err() {
            return;
        }
        match step.split_once('.') {
            Some((_, fraction)) if !fraction.is_empty() => self.precision = Some(fraction.len()),
            _ => self.integer = true,
        }
    }
}

/// Supported field types
#[derive(Debug, Clone)]
pub enum FieldType {
    /// UTF-8 string
    Text {
        email: bool,
        min_length: Option<usize>,
        max_length: Option<usize>,
    },
    /// Number
    Number(NumberRules),
    /// Anything
    Any,
    /// Nested object
    Object(ObjectSchema),
    /// List of row objects
    Rows(ObjectSchema),
}

impl FieldType {
    /// Plain text, no bounds
    pub fn text() -> Self {
        FieldType::Text {
            email: false,
            min_length: None,
            max_length: None,
        }
    }

    /// Returns the type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldType::Text { .. } => "string",
            FieldType::Number(_) => "number",
            FieldType::Any => "any",
            FieldType::Object(_) => "object",
            FieldType::Rows(_) => "array",
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, FieldType::Text { .. })
    }
}

/// Caller-supplied logic attached to a field
#[derive(Debug, Clone, PartialEq)]
pub enum DynamicRule {
    /// Scripted rule source
    Script(String),
    /// Logic-tree rule
    Logic(Value),
}

/// Field definition
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub key: String,
    pub field_type: FieldType,
    pub required: bool,
    /// Unanchored; text fields only
    pub pattern: Option<Regex>,
    pub rules: Vec<DynamicRule>,
    /// Value is a list of nullable elements of `field_type`
    pub multiple: bool,
    /// Component metadata handed to scripted rules
    pub metadata: Value,
}

impl FieldDef {
    /// Create an unconstrained field
    pub fn new(key: &str, field_type: FieldType) -> Self {
        Self {
            key: key.to_string(),
            field_type,
            required: false,
            pattern: None,
            rules: Vec::new(),
            multiple: false,
            metadata: Value::Null,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    pub fn with_rule(mut self, rule: DynamicRule) -> Self {
        self.rules.push(rule);
        self
    }
}

/// Ordered field definitions of one object level
#[derive(Debug, Clone, Default)]
pub struct ObjectSchema {
    fields: Vec<FieldDef>,
    /// Keys without a definition are dropped from the output
    pub strip_unknown: bool,
}

impl ObjectSchema {
    pub fn new(strip_unknown: bool) -> Self {
        Self {
            fields: Vec::new(),
            strip_unknown,
        }
    }

    /// Adds a field. A field with the same key is replaced in place.
    pub fn insert(&mut self, field: FieldDef) {
        match self.fields.iter_mut().find(|f| f.key == field.key) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
    }

    pub fn get(&self, key: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Output of one compilation: the root validator and the unique fields
/// found by the same walk.
#[derive(Debug, Clone, Default)]
pub struct CompiledSchema {
    pub root: ObjectSchema,
    pub unique: UniquenessRegistry,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_rules() {
        let mut cents = NumberRules::default();
        cents.apply_step("0.01");
        assert_eq!(cents.precision, Some(2));
        assert!(!cents.integer);

        let mut whole = NumberRules::default();
        whole.apply_step("1");
        assert!(whole.integer);

        let mut any = NumberRules::default();
        any.apply_step("any");
        any.apply_step("abc");
        assert_eq!(any, NumberRules::default());
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut schema = ObjectSchema::new(true);
        schema.insert(FieldDef::new("a", FieldType::text()));
        schema.insert(FieldDef::new("b", FieldType::Any));
        schema.insert(FieldDef::new("a", FieldType::Number(NumberRules::default())));

        let keys: Vec<_> = schema.fields().iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(schema.get("a").map(|f| f.field_type.type_name()), Some("number"));
    }
}
