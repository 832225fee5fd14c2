//! Sandbox Limit Tests
//!
//! Caller-supplied scripts run under a deadline, a step ceiling and size
//! limits. A runaway rule rejects its field; a runaway conditional shows
//! its field. Neither blocks the pass.

use std::sync::Arc;
use std::time::{Duration, Instant};

use formguard::component::Form;
use formguard::engine::{EngineConfig, Submission, SubmissionValidator, ValidationError};
use formguard::schema::{FieldError, RuleKind};
use formguard::unique::InMemoryStore;
use serde_json::{json, Value};

// =============================================================================
// Helper Functions
// =============================================================================

fn validator(config: EngineConfig) -> SubmissionValidator {
    config.validate().unwrap();
    SubmissionValidator::new(&config, Arc::new(InMemoryStore::new()))
}

fn form(value: Value) -> Form {
    serde_json::from_value(value).unwrap()
}

fn errors(result: Result<Option<Value>, ValidationError>) -> Vec<FieldError> {
    match result {
        Err(ValidationError::Rejected(report)) => report.errors,
        other => panic!("expected rejection, got {:?}", other),
    }
}

fn short_deadline() -> EngineConfig {
    EngineConfig {
        custom_rule_timeout_ms: 20,
        conditional_timeout_ms: 20,
        max_script_steps: u64::MAX,
        ..EngineConfig::default()
    }
}

// =============================================================================
// Deadline Tests
// =============================================================================

/// An endless rule is cut off at the deadline and rejects its field.
#[tokio::test]
async fn test_endless_rule_times_out() {
    let validator = validator(short_deadline());
    let form = form(json!({ "components": [
        { "type": "textfield", "key": "spin", "validate": { "custom": "while (true) {}" } },
        { "type": "textfield", "key": "after", "validate": { "required": true } }
    ]}));

    let started = Instant::now();
    let errors = errors(validator.validate(&form, &Submission::new(None, json!({ "spin": "x" }))).await);
    assert!(started.elapsed() < Duration::from_secs(2));

    // The pass continues past the runaway rule
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0].field_path, "spin");
    assert_eq!(errors[0].kind, RuleKind::Custom);
    assert_eq!(errors[0].message, "Script execution timed out after 20ms");
    assert_eq!(errors[1].kind, RuleKind::Required);
}

/// An endless conditional is cut off and the field stays visible.
#[tokio::test]
async fn test_endless_conditional_shows_field() {
    let validator = validator(short_deadline());
    let form = form(json!({ "components": [
        { "type": "textfield", "key": "maybe", "customConditional": "while (true) { show = false; }" }
    ]}));

    let started = Instant::now();
    let document = validator
        .validate(&form, &Submission::new(None, json!({ "maybe": "kept" })))
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(document, Some(json!({ "maybe": "kept" })));
}

// =============================================================================
// Step And Size Tests
// =============================================================================

/// The step ceiling stops loops that would finish within the deadline.
#[tokio::test]
async fn test_step_ceiling() {
    let validator = validator(EngineConfig {
        custom_rule_timeout_ms: 10_000,
        max_script_steps: 1_000,
        ..EngineConfig::default()
    });
    let form = form(json!({ "components": [
        { "type": "textfield", "key": "count",
          "validate": { "custom": "var i = 0; while (i < 100000) { i = i + 1; } valid = true;" } }
    ]}));

    let errors = errors(validator.validate(&form, &Submission::new(None, json!({ "count": "x" }))).await);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "Script exceeded the step limit of 1000");
}

/// Oversized scripts are refused without running.
#[tokio::test]
async fn test_oversized_script_rejected() {
    let validator = validator(EngineConfig {
        max_script_bytes: 16,
        ..EngineConfig::default()
    });
    let form = form(json!({ "components": [
        { "type": "textfield", "key": "big",
          "validate": { "custom": "valid = input.length > 0 && input.length < 100;" } },
        { "type": "textfield", "key": "small", "validate": { "custom": "valid = true;" } }
    ]}));

    let errors = errors(
        validator
            .validate(&form, &Submission::new(None, json!({ "big": "x", "small": "y" })))
            .await,
    );
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field_path, "big");
    assert!(errors[0].message.starts_with("Script exceeds size limit"));
}

/// Logic trees deeper than the nesting limit reject the value.
#[tokio::test]
async fn test_deep_logic_rule_rejected() {
    let validator = validator(EngineConfig {
        max_nesting_depth: 4,
        ..EngineConfig::default()
    });

    let mut rule = json!(true);
    for _ in 0..10 {
        rule = json!({ "!!": [rule] });
    }
    let form = form(json!({ "components": [
        { "type": "textfield", "key": "deep", "validate": { "json": rule } }
    ]}));

    let errors = errors(validator.validate(&form, &Submission::new(None, json!({ "deep": "x" }))).await);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, RuleKind::Logic);
}

/// Long operator chains hit the nesting limit instead of exhausting the stack.
#[tokio::test]
async fn test_long_operator_chain_rejected() {
    let validator = validator(EngineConfig::default());
    let rule = format!("valid = 1{} > 0;", "+1".repeat(30_000));
    let show = format!("show = false{}", " || false".repeat(6_000));
    let form = form(json!({ "components": [
        { "type": "textfield", "key": "sum", "validate": { "custom": rule } },
        { "type": "textfield", "key": "shown", "customConditional": show }
    ]}));

    let errors = errors(
        validator
            .validate(&form, &Submission::new(None, json!({ "sum": "x", "shown": "kept" })))
            .await,
    );
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field_path, "sum");
    assert_eq!(errors[0].kind, RuleKind::Custom);
    assert_eq!(errors[0].message, "Expression nesting exceeds limit of 64");
}

// =============================================================================
// Isolation Tests
// =============================================================================

/// Only the documented bindings are in scope.
#[tokio::test]
async fn test_unknown_globals_fail_rule() {
    let validator = validator(EngineConfig::default());
    let form = form(json!({ "components": [
        { "type": "textfield", "key": "probe", "validate": { "custom": "valid = process.env.HOME != '';" } }
    ]}));

    let errors = errors(validator.validate(&form, &Submission::new(None, json!({ "probe": "x" }))).await);
    assert_eq!(errors[0].kind, RuleKind::Custom);
    assert_eq!(errors[0].message, "ReferenceError: process is not defined");
}

/// Scripts cannot change the document being validated.
#[tokio::test]
async fn test_scripts_cannot_mutate_data() {
    let validator = validator(EngineConfig::default());
    let form = form(json!({ "components": [
        { "type": "textfield", "key": "a", "validate": { "custom": "data.a = 'changed'; valid = true;" } }
    ]}));

    let result = validator.validate(&form, &Submission::new(None, json!({ "a": "original" }))).await;
    match result {
        Ok(document) => assert_eq!(document, Some(json!({ "a": "original" }))),
        Err(ValidationError::Rejected(report)) => assert_eq!(report.errors[0].kind, RuleKind::Custom),
        Err(other) => panic!("unexpected error {:?}", other),
    }
}
