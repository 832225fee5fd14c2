//! Uniqueness Lookup Tests
//!
//! Lookups run one at a time in form order. The first conflict stops the
//! pass; store failures and cancellation surface as errors, never as
//! verdicts.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use formguard::component::Form;
use formguard::engine::{EngineConfig, Submission, SubmissionValidator, ValidationError};
use formguard::schema::RuleKind;
use formguard::unique::{DocumentStore, InMemoryStore, StoreError, StoreQuery, StoreResult, StoredRecord};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

// =============================================================================
// Test Stores
// =============================================================================

/// Records every query, then answers from an in-memory store.
#[derive(Debug, Default)]
struct RecordingStore {
    inner: InMemoryStore,
    queries: Mutex<Vec<StoreQuery>>,
}

impl RecordingStore {
    fn queried_fields(&self) -> Vec<String> {
        self.queries
            .lock()
            .unwrap()
            .iter()
            .map(|q| q.filters.last().map(|f| f.field.clone()).unwrap_or_default())
            .collect()
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn find_one(&self, query: &StoreQuery) -> StoreResult<Option<StoredRecord>> {
        self.queries.lock().unwrap().push(query.clone());
        self.inner.find_one(query).await
    }
}

/// Fails every lookup.
#[derive(Debug)]
struct UnavailableStore;

#[async_trait]
impl DocumentStore for UnavailableStore {
    async fn find_one(&self, _query: &StoreQuery) -> StoreResult<Option<StoredRecord>> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn unique_form() -> Form {
    serde_json::from_value(json!({
        "_id": "accounts",
        "components": [
            { "type": "email", "key": "email", "label": "Email", "unique": true },
            { "type": "textfield", "key": "username", "label": "Username", "unique": true },
            { "type": "textfield", "key": "nickname", "unique": true },
            { "type": "textfield", "key": "bio", "validate": { "maxLength": 3 } }
        ]
    }))
    .unwrap()
}

fn validator_with(store: Arc<dyn DocumentStore>) -> SubmissionValidator {
    SubmissionValidator::new(&EngineConfig::default(), store)
}

fn data() -> Value {
    json!({ "email": "ada@example.com", "username": "ada", "nickname": "countess", "bio": "too long" })
}

// =============================================================================
// Ordering Tests
// =============================================================================

/// Without conflicts every unique field is looked up, in form order.
#[tokio::test]
async fn test_lookups_follow_form_order() {
    let store = Arc::new(RecordingStore::default());
    let validator = validator_with(store.clone());

    let submission = Submission::new(Some("accounts"), json!({ "email": "ada@example.com", "username": "ada", "nickname": "c" }));
    validator.validate(&unique_form(), &submission).await.unwrap();

    assert_eq!(store.queried_fields(), vec!["data.email", "data.username", "data.nickname"]);
}

/// The lookup after a conflict is never issued, and structural errors are
/// not reported alongside the conflict.
#[tokio::test]
async fn test_conflict_stops_further_lookups() {
    let store = Arc::new(RecordingStore::default());
    store
        .inner
        .insert(json!({ "_id": "existing", "form": "accounts", "data": { "username": "ADA" } }))
        .await;
    let validator = validator_with(store.clone());

    let result = validator.validate(&unique_form(), &Submission::new(Some("accounts"), data())).await;

    let report = match result {
        Err(ValidationError::Rejected(report)) => report,
        other => panic!("expected rejection, got {:?}", other),
    };
    assert_eq!(report.len(), 1);
    assert_eq!(report.errors[0].field_path, "username");
    assert_eq!(report.errors[0].kind, RuleKind::Unique);
    assert_eq!(report.errors[0].message, "Username must be unique.");
    assert_eq!(store.queried_fields(), vec!["data.email", "data.username"]);
}

/// The label falls back to the key.
#[tokio::test]
async fn test_conflict_message_without_label() {
    let store = Arc::new(InMemoryStore::new());
    store
        .insert(json!({ "form": "accounts", "data": { "nickname": "countess" } }))
        .await;
    let validator = validator_with(store);

    let submission = Submission::new(Some("accounts"), json!({ "nickname": "countess" }));
    let err = validator.validate(&unique_form(), &submission).await.unwrap_err();
    assert_eq!(err.report().unwrap().errors[0].message, "nickname must be unique.");
}

// =============================================================================
// Scope Tests
// =============================================================================

/// Records of other forms, deleted records and the submission itself are
/// not conflicts.
#[tokio::test]
async fn test_lookup_scope() {
    let store = Arc::new(InMemoryStore::new());
    store
        .insert(json!({ "_id": "other-form", "form": "newsletter", "data": { "email": "ada@example.com" } }))
        .await;
    store
        .insert(json!({ "_id": "gone", "form": "accounts", "deleted": 1700000000, "data": { "email": "ada@example.com" } }))
        .await;
    store
        .insert(json!({ "_id": "self", "form": "accounts", "data": { "email": "ada@example.com" } }))
        .await;
    let validator = validator_with(store);

    let update = Submission::new(Some("accounts"), json!({ "email": "ada@example.com" })).with_id("self");
    assert!(validator.validate(&unique_form(), &update).await.is_ok());

    let fresh = Submission::new(Some("accounts"), json!({ "email": "ada@example.com" }));
    assert!(validator.validate(&unique_form(), &fresh).await.unwrap_err().is_rejection());
}

/// Empty values are never looked up.
#[tokio::test]
async fn test_empty_values_skip_lookup() {
    let store = Arc::new(RecordingStore::default());
    let validator = validator_with(store.clone());

    let submission = Submission::new(Some("accounts"), json!({ "email": "", "nickname": "" }));
    validator.validate(&unique_form(), &submission).await.unwrap();
    assert!(store.queried_fields().is_empty());
}

// =============================================================================
// Value Shape Tests
// =============================================================================

/// Places conflict on `place_id` alone, whatever their address details.
#[tokio::test]
async fn test_place_reference_conflict() {
    let form: Form = serde_json::from_value(json!({
        "_id": "venues",
        "components": [{ "type": "address", "key": "location", "label": "Location", "unique": true }]
    }))
    .unwrap();
    let store = Arc::new(InMemoryStore::new());
    store
        .insert(json!({
            "form": "venues",
            "data": { "location": {
                "place_id": "ChIJ-Oslo",
                "formatted_address": "Oslo, Norway",
                "address_components": [{ "long_name": "Oslo" }]
            }}
        }))
        .await;
    let validator = validator_with(store);

    let same_place = Submission::new(
        Some("venues"),
        json!({ "location": {
            "place_id": "chij-oslo",
            "formatted_address": "Oslo",
            "address_components": []
        }}),
    );
    let err = validator.validate(&form, &same_place).await.unwrap_err();
    let report = err.report().unwrap();
    assert_eq!(report.len(), 1);
    assert_eq!(report.errors[0].field_path, "location");
    assert_eq!(report.errors[0].message, "Location must be unique.");

    let other_place = Submission::new(
        Some("venues"),
        json!({ "location": {
            "place_id": "ChIJ-Bergen",
            "formatted_address": "Oslo, Norway",
            "address_components": [{ "long_name": "Oslo" }]
        }}),
    );
    assert!(validator.validate(&form, &other_place).await.is_ok());
}

/// A list conflicts with a stored list holding all of its elements, in any order.
#[tokio::test]
async fn test_list_containment_conflict() {
    let form: Form = serde_json::from_value(json!({
        "_id": "teams",
        "components": [{ "type": "textfield", "key": "members", "multiple": true, "unique": true }]
    }))
    .unwrap();
    let store = Arc::new(RecordingStore::default());
    store
        .inner
        .insert(json!({ "form": "teams", "data": { "members": ["ada", "grace", "linus"] } }))
        .await;
    let validator = validator_with(store.clone());

    let reordered = Submission::new(Some("teams"), json!({ "members": ["linus", "ada"] }));
    let err = validator.validate(&form, &reordered).await.unwrap_err();
    assert!(err.report().unwrap().has_kind(RuleKind::Unique));

    let partly_new = Submission::new(Some("teams"), json!({ "members": ["ada", "alan"] }));
    assert!(validator.validate(&form, &partly_new).await.is_ok());

    assert_eq!(store.queried_fields(), vec!["data.members", "data.members"]);
}

// =============================================================================
// Failure Mode Tests
// =============================================================================

/// A failing store aborts the pass with a store error, not a verdict.
#[tokio::test]
async fn test_store_failure_is_not_a_verdict() {
    let validator = validator_with(Arc::new(UnavailableStore));

    let result = validator.validate(&unique_form(), &Submission::new(Some("accounts"), data())).await;
    match result {
        Err(ValidationError::Store(StoreError::Unavailable(message))) => assert_eq!(message, "connection refused"),
        other => panic!("expected store error, got {:?}", other),
    }
}

/// A cancelled pass issues no lookups and reaches no verdict.
#[tokio::test]
async fn test_cancelled_pass() {
    let store = Arc::new(RecordingStore::default());
    let validator = validator_with(store.clone());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = validator
        .validate_with_cancel(&unique_form(), &Submission::new(Some("accounts"), data()), &cancel)
        .await;
    assert!(matches!(result, Err(ValidationError::Cancelled)));
    assert!(store.queried_fields().is_empty());
}
