//! Schema validator for submission data
//!
//! Validation semantics:
//! - Every field is checked and every violation is collected
//! - Absent optional fields are skipped; `""` is absent for text fields
//! - Numeric strings are coerced to numbers
//! - Unknown keys are dropped from the root and containers, kept in grid rows
//! - Custom and logic rules run on every present value
//!
//! The input document is never mutated; the validated copy is returned
//! next to the report.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Map, Value};

use crate::sandbox::{format_number, Bindings, RuleOutcome, Sandbox};

use super::errors::{FieldError, RuleKind, ValidationReport};
use super::types::{DynamicRule, FieldDef, FieldType, NumberRules, ObjectSchema};

/// Largest integer an f64 holds exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// State of one validation pass.
struct Pass<'d> {
    /// Whole document, as seen by custom and logic rules
    data: &'d Value,
    report: ValidationReport,
}

impl Pass<'_> {
    fn fail(&mut self, path: &str, kind: RuleKind, message: String) {
        self.report.push(FieldError::new(path, kind, message));
    }
}

/// Validates documents against a compiled schema.
///
/// Holds the sandbox used for custom and logic rules. Validation is
/// deterministic for a given document, apart from rules that hit their
/// time budget.
pub struct SchemaValidator<'a> {
    sandbox: &'a Sandbox,
}

impl<'a> SchemaValidator<'a> {
    /// Creates a new validator running rules in the given sandbox.
    pub fn new(sandbox: &'a Sandbox) -> Self {
        Self { sandbox }
    }

    /// Validates a document against the root schema.
    ///
    /// # Arguments
    ///
    /// * `schema` - The root object schema
    /// * `data` - The sanitized submission data
    ///
    /// # Returns
    ///
    /// The validated, coerced copy of `data` and the report of every
    /// violation found. The copy is only meaningful when the report is
    /// empty.
    pub fn validate(&self, schema: &ObjectSchema, data: &Value) -> (Value, ValidationReport) {
        let mut pass = Pass {
            data,
            report: ValidationReport::new(),
        };

        let output = match data {
            Value::Object(obj) => {
                let mut output = self.validate_object(&mut pass, schema, obj, data, "");
                // The root accepts the submission id alongside the fields.
                if let Some(id) = obj.get("_id").filter(|_| !schema.contains("_id")) {
                    if !id.is_string() {
                        pass.fail("_id", RuleKind::Type, "\"_id\" must be a string".to_string());
                    }
                    output.insert("_id".to_string(), id.clone());
                }
                Value::Object(output)
            }
            other => {
                pass.fail("", RuleKind::Type, "\"value\" must be an object".to_string());
                other.clone()
            }
        };

        (output, pass.report)
    }

    /// Validates an object against field definitions.
    ///
    /// `holder` is the object itself as a value; rules of its fields see it
    /// as `row`.
    fn validate_object(
        &self,
        pass: &mut Pass<'_>,
        schema: &ObjectSchema,
        obj: &Map<String, Value>,
        holder: &Value,
        path_prefix: &str,
    ) -> Map<String, Value> {
        let mut output = Map::new();

        for field in schema.fields() {
            let field_path = make_path(path_prefix, &field.key);
            if let Some(value) = self.validate_field(pass, field, obj.get(&field.key), holder, &field_path) {
                output.insert(field.key.clone(), value);
            }
        }

        if !schema.strip_unknown {
            for (key, value) in obj {
                if !schema.contains(key) {
                    output.insert(key.clone(), value.clone());
                }
            }
        }

        output
    }

    /// Validates a field, unwrapping lists of values for `multiple` fields.
    fn validate_field(
        &self,
        pass: &mut Pass<'_>,
        field: &FieldDef,
        value: Option<&Value>,
        row: &Value,
        field_path: &str,
    ) -> Option<Value> {
        if !field.multiple {
            return self.validate_value(pass, field, value, row, field_path, &field.key, field.required);
        }

        match value {
            None | Some(Value::Null) => {
                if field.required {
                    pass.fail(field_path, RuleKind::Required, format!("\"{}\" is required", field.key));
                }
                value.cloned()
            }
            Some(Value::Array(items)) => {
                if field.required && items.is_empty() {
                    pass.fail(
                        field_path,
                        RuleKind::Required,
                        format!("\"{}\" must contain at least 1 items", field.key),
                    );
                }
                let validated = items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        if item.is_null() {
                            return Value::Null;
                        }
                        let item_path = format!("{}.{}", field_path, i);
                        self.validate_value(pass, field, Some(item), row, &item_path, &i.to_string(), false)
                            .unwrap_or(Value::Null)
                    })
                    .collect();
                Some(Value::Array(validated))
            }
            Some(other) => {
                pass.fail(field_path, RuleKind::Type, format!("\"{}\" must be an array", field.key));
                Some(other.clone())
            }
        }
    }

    /// Validates a single value against a field's type and rules.
    ///
    /// Returns the value to store, `None` when the field is absent.
    #[allow(clippy::too_many_arguments)]
    fn validate_value(
        &self,
        pass: &mut Pass<'_>,
        field: &FieldDef,
        value: Option<&Value>,
        row: &Value,
        field_path: &str,
        label: &str,
        required: bool,
    ) -> Option<Value> {
        let Some(value) = value else {
            if required {
                pass.fail(field_path, RuleKind::Required, format!("\"{}\" is required", label));
            }
            return None;
        };
        if value.is_null() && required {
            pass.fail(field_path, RuleKind::Required, format!("\"{}\" is required", label));
            return Some(Value::Null);
        }

        let output = match &field.field_type {
            FieldType::Text {
                email,
                min_length,
                max_length,
            } => match value {
                Value::String(text) if text.is_empty() => {
                    if required {
                        pass.fail(
                            field_path,
                            RuleKind::Required,
                            format!("\"{}\" is not allowed to be empty", label),
                        );
                    }
                    return Some(value.clone());
                }
                Value::String(text) => {
                    check_length(pass, text, *min_length, *max_length, field_path, label);
                    if *email && !is_email(text) {
                        pass.fail(field_path, RuleKind::Pattern, format!("\"{}\" must be a valid email", label));
                    }
                    if let Some(pattern) = &field.pattern {
                        if !pattern.is_match(text) {
                            pass.fail(
                                field_path,
                                RuleKind::Pattern,
                                format!(
                                    "\"{}\" with value \"{}\" fails to match the required pattern: /{}/",
                                    label,
                                    text,
                                    pattern.as_str()
                                ),
                            );
                        }
                    }
                    value.clone()
                }
                _ => {
                    pass.fail(field_path, RuleKind::Type, format!("\"{}\" must be a string", label));
                    return Some(value.clone());
                }
            },
            FieldType::Number(rules) => {
                if value.is_null() {
                    return None;
                }
                let Some(number) = as_number(value) else {
                    pass.fail(field_path, RuleKind::Type, format!("\"{}\" must be a number", label));
                    return Some(value.clone());
                };
                check_number(pass, number, rules, field_path, label);
                if value.is_number() {
                    value.clone()
                } else {
                    number_value(number)
                }
            }
            FieldType::Any => value.clone(),
            FieldType::Object(schema) => match value {
                Value::Object(obj) => Value::Object(self.validate_object(pass, schema, obj, value, field_path)),
                _ => {
                    pass.fail(field_path, RuleKind::Type, format!("\"{}\" must be an object", label));
                    return Some(value.clone());
                }
            },
            FieldType::Rows(schema) => match value {
                Value::Array(rows) => {
                    let validated = rows
                        .iter()
                        .enumerate()
                        .map(|(i, row_value)| {
                            let row_path = format!("{}.{}", field_path, i);
                            match row_value {
                                Value::Null => Value::Null,
                                Value::Object(obj) => {
                                    Value::Object(self.validate_object(pass, schema, obj, row_value, &row_path))
                                }
                                other => {
                                    pass.fail(&row_path, RuleKind::Type, format!("\"{}\" must be an object", i));
                                    other.clone()
                                }
                            }
                        })
                        .collect();
                    Value::Array(validated)
                }
                _ => {
                    pass.fail(field_path, RuleKind::Type, format!("\"{}\" must be an array", label));
                    return Some(value.clone());
                }
            },
        };

        self.run_rules(pass, field, &output, row, field_path);
        Some(output)
    }

    /// Runs custom and logic rules. Evaluation errors are violations.
    fn run_rules(&self, pass: &mut Pass<'_>, field: &FieldDef, value: &Value, row: &Value, field_path: &str) {
        if field.rules.is_empty() {
            return;
        }

        let bindings = Bindings {
            input: Some(value),
            data: pass.data,
            row,
            component: Some(&field.metadata),
        };
        let default_message = format!("\"{}\" is invalid", field.key);

        for rule in &field.rules {
            let (kind, outcome) = match rule {
                DynamicRule::Script(source) => (
                    RuleKind::Custom,
                    self.sandbox.evaluate_rule(source, &bindings, &default_message),
                ),
                DynamicRule::Logic(logic) => (
                    RuleKind::Logic,
                    self.sandbox.evaluate_logic_rule(logic, &bindings, &default_message),
                ),
            };
            if let RuleOutcome::Fail(message) = outcome {
                pass.fail(field_path, kind, message);
            }
        }
    }
}

fn check_length(
    pass: &mut Pass<'_>,
    text: &str,
    min_length: Option<usize>,
    max_length: Option<usize>,
    field_path: &str,
    label: &str,
) {
    let length = text.chars().count();
    if let Some(min) = min_length.filter(|min| length < *min) {
        pass.fail(
            field_path,
            RuleKind::Length,
            format!("\"{}\" length must be at least {} characters long", label, min),
        );
    }
    if let Some(max) = max_length.filter(|max| length > *max) {
        pass.fail(
            field_path,
            RuleKind::Length,
            format!("\"{}\" length must be less than or equal to {} characters long", label, max),
        );
    }
}

fn check_number(pass: &mut Pass<'_>, number: f64, rules: &NumberRules, field_path: &str, label: &str) {
    if rules.integer && number.fract() != 0.0 {
        pass.fail(field_path, RuleKind::Type, format!("\"{}\" must be an integer", label));
    }
    if let Some(precision) = rules.precision.filter(|p| decimal_places(number) > *p) {
        pass.fail(
            field_path,
            RuleKind::Pattern,
            format!("\"{}\" must have no more than {} decimal places", label, precision),
        );
    }

    let bounds = [
        (rules.min, number < rules.min.unwrap_or(f64::NAN), "larger than or equal to"),
        (rules.max, number > rules.max.unwrap_or(f64::NAN), "less than or equal to"),
        (rules.greater, number <= rules.greater.unwrap_or(f64::NAN), "greater than"),
        (rules.less, number >= rules.less.unwrap_or(f64::NAN), "less than"),
    ];
    for (bound, violated, relation) in bounds {
        if let (Some(bound), true) = (bound, violated) {
            pass.fail(
                field_path,
                RuleKind::Range,
                format!("\"{}\" must be {} {}", label, relation, format_number(bound)),
            );
        }
    }
}

/// Numbers, and strings holding a finite number.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite() && !s.trim().is_empty()),
        _ => None,
    }
}

fn number_value(number: f64) -> Value {
    if number.fract() == 0.0 && number.abs() <= MAX_SAFE_INTEGER {
        return json!(number as i64);
    }
    serde_json::Number::from_f64(number).map_or(Value::Null, Value::Number)
}

/// Digits after the decimal point in the shortest representation.
fn decimal_places(number: f64) -> usize {
    let text = number.to_string();
    text.split_once('.').map_or(0, |(_, fraction)| fraction.len())
}

fn email_pattern() -> Option<&'static Regex> {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@.]+(\.[^\s@.]+)+$").ok())
        .as_ref()
}

fn is_email(text: &str) -> bool {
    email_pattern().map_or(true, |pattern| pattern.is_match(text))
}

/// Creates a field path from prefix and field name.
fn make_path(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", prefix, field)
    }
}
