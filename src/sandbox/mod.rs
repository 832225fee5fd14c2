//! Sandboxed rule evaluation
//!
//! Runs untrusted, form-author supplied logic against a read-only view of
//! the submission:
//!
//! - scripted rules in a restricted JavaScript-like language, interpreted
//!   in-process with a wall-clock deadline and a step ceiling
//! - logic-tree rules in the json-logic dialect, bounded by nesting depth
//!
//! Scripts never see process state, the filesystem or the network; the only
//! names in scope are the bindings listed in [`Bindings`].
//!
//! The two callers treat failures differently. Conditionals fail open (a
//! broken conditional shows the field), data rules fail closed (a broken rule
//! rejects the value with the evaluator's message).

mod errors;
mod logic;
mod script;
mod template;
mod value;

pub use errors::{EvalError, EvalResult};
pub use logic::{evaluate_logic, logic_truthy};
pub use template::interpolate;
pub use value::format_number;

use serde_json::{json, Value};
use tracing::debug;

use crate::observability::{log_event_with_fields, Event};

use script::{Budget, Interpreter};
use value::Val;

/// Which result variable a script communicates through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    /// Field rule; `valid` starts as `true`
    CustomRule,
    /// Visibility script; `show` starts undefined
    Conditional,
}

impl ScriptKind {
    fn result_variable(self) -> &'static str {
        match self {
            ScriptKind::CustomRule => "valid",
            ScriptKind::Conditional => "show",
        }
    }
}

/// Read-only values a script may reference.
#[derive(Debug, Clone, Copy)]
pub struct Bindings<'a> {
    pub input: Option<&'a Value>,
    pub data: &'a Value,
    pub row: &'a Value,
    pub component: Option<&'a Value>,
}

impl<'a> Bindings<'a> {
    /// Bindings for a whole-document evaluation, such as a conditional.
    pub fn document(data: &'a Value) -> Self {
        Self {
            input: None,
            data,
            row: data,
            component: None,
        }
    }
}

/// Verdict of a data rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    Pass,
    Fail(String),
}

impl RuleOutcome {
    /// Maps a rule result: only `true` passes, a string is the message.
    fn from_result(result: &Value, default_message: &str) -> Self {
        match result {
            Value::Bool(true) => RuleOutcome::Pass,
            Value::String(message) => RuleOutcome::Fail(message.clone()),
            _ => RuleOutcome::Fail(default_message.to_string()),
        }
    }
}

/// Evaluation limits; see `EngineConfig` for the configured values.
#[derive(Debug, Clone)]
pub struct Sandbox {
    pub custom_rule_timeout_ms: u64,
    pub conditional_timeout_ms: u64,
    pub max_steps: u64,
    pub max_script_bytes: usize,
    pub max_nesting_depth: usize,
}

impl Default for Sandbox {
    fn default() -> Self {
        Self {
            custom_rule_timeout_ms: 100,
            conditional_timeout_ms: 250,
            max_steps: 1_000_000,
            max_script_bytes: 64 * 1024,
            max_nesting_depth: 64,
        }
    }
}

impl Sandbox {
    /// Runs a script and returns its result: the `return` value if the
    /// script returned, otherwise the final `valid` or `show` variable.
    pub fn run(&self, source: &str, bindings: &Bindings<'_>, kind: ScriptKind) -> EvalResult<Value> {
        if source.len() > self.max_script_bytes {
            return Err(EvalError::TooLarge {
                max: self.max_script_bytes,
                actual: source.len(),
            });
        }
        let program = script::parse(source, self.max_nesting_depth)?;

        let timeout_ms = match kind {
            ScriptKind::CustomRule => self.custom_rule_timeout_ms,
            ScriptKind::Conditional => self.conditional_timeout_ms,
        };
        let budget = Budget {
            timeout_ms,
            max_steps: self.max_steps,
        };

        let mut globals = vec![
            ("input", Val::from_ref(bindings.input)),
            ("data", Val::Ref(bindings.data)),
            ("row", Val::Ref(bindings.row)),
            ("component", Val::from_ref(bindings.component)),
        ];
        if source.contains("scope") {
            globals.push(("scope", Val::Own(json!({ "data": bindings.data }))));
        }

        let mut interpreter = Interpreter::new(globals, budget);
        let result_variable = kind.result_variable();
        match kind {
            ScriptKind::CustomRule => interpreter.declare(result_variable, Val::bool(true)),
            ScriptKind::Conditional => interpreter.declare(result_variable, Val::Undefined),
        }

        let returned = interpreter.run(&program)?;
        debug!(steps = interpreter.steps(), kind = ?kind, "script finished");
        Ok(match returned {
            Some(value) => value.into_json(),
            None => interpreter
                .local(result_variable)
                .map(Val::to_json)
                .unwrap_or(Value::Null),
        })
    }

    /// Evaluates a custom field rule. `{{ path }}` placeholders are resolved
    /// against the document first. Evaluation errors fail the rule.
    pub fn evaluate_rule(&self, source: &str, bindings: &Bindings<'_>, default_message: &str) -> RuleOutcome {
        let source = interpolate(source, bindings.data);
        match self.run(&source, bindings, ScriptKind::CustomRule) {
            Ok(result) => RuleOutcome::from_result(&result, default_message),
            Err(err) => {
                let message = err.to_string();
                log_event_with_fields(Event::RuleEvaluationFailed, &[("rule", "custom"), ("error", message.as_str())]);
                RuleOutcome::Fail(message)
            }
        }
    }

    /// Evaluates a logic-tree field rule. Evaluation errors fail the rule.
    pub fn evaluate_logic_rule(&self, rule: &Value, bindings: &Bindings<'_>, default_message: &str) -> RuleOutcome {
        match evaluate_logic(rule, bindings.data, bindings.row, self.max_nesting_depth) {
            Ok(result) => RuleOutcome::from_result(&result, default_message),
            Err(err) => {
                let message = err.to_string();
                log_event_with_fields(Event::RuleEvaluationFailed, &[("rule", "logic"), ("error", message.as_str())]);
                RuleOutcome::Fail(message)
            }
        }
    }

    /// Evaluates a custom conditional script. Anything but an explicit
    /// false (`false` or `"false"`) shows the component, errors included.
    pub fn evaluate_conditional(&self, source: &str, data: &Value) -> bool {
        match self.run(source, &Bindings::document(data), ScriptKind::Conditional) {
            Ok(Value::Bool(show)) => show,
            Ok(Value::String(show)) if show == "false" => false,
            Ok(_) => true,
            Err(err) => {
                debug!(error = %err, "conditional script failed, showing component");
                true
            }
        }
    }

    /// Evaluates a logic-tree condition with `{data, row: null}`. Errors
    /// show the component.
    pub fn evaluate_logic_condition(&self, rule: &Value, data: &Value) -> bool {
        match evaluate_logic(rule, data, &Value::Null, self.max_nesting_depth) {
            Ok(result) => logic_truthy(&result),
            Err(err) => {
                debug!(error = %err, "logic condition failed, showing component");
                true
            }
        }
    }
}
