//! Sequential uniqueness checks

use std::collections::HashMap;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::component::DataPath;
use crate::observability::{log_event_with_fields, Event};
use crate::schema::{FieldError, RuleKind};

use super::errors::{UniqueCheckError, UniqueResult};
use super::query::{FilterExpr, StoreQuery};
use super::registry::{UniqueValue, UniquenessRegistry};
use super::store::DocumentStore;

/// Identity of the submission being checked.
#[derive(Debug, Clone, Copy, Default)]
pub struct LookupScope<'a> {
    /// Form the submission belongs to; lookups are confined to it
    pub form_id: Option<&'a str>,
    /// The submission's own id; a stored record with this id is not a conflict
    pub submission_id: Option<&'a str>,
}

/// Builds the store query for one unique value.
pub fn build_query(scope: &LookupScope<'_>, dotted: &str, value: &UniqueValue) -> StoreQuery {
    let mut query = StoreQuery::new();
    if let Some(form_id) = scope.form_id {
        query = query.and(FilterExpr::eq("form", json!(form_id)));
    }
    query
        .and(FilterExpr::is_null("deleted"))
        .and(value.filter(dotted))
}

/// Checks every registered field in order, stopping at the first conflict.
///
/// Fields whose value is empty, or whose path crosses a repeating component,
/// are skipped. Cancellation is observed before each lookup.
///
/// # Errors
///
/// - `Conflict` with a `unique` field error when a stored record holds the value
/// - `Store` when a lookup fails
/// - `Cancelled` when the token fires between lookups
pub async fn check_all(
    registry: &UniquenessRegistry,
    scope: &LookupScope<'_>,
    data: &Value,
    paths: &HashMap<String, DataPath>,
    store: &dyn DocumentStore,
    cancel: &CancellationToken,
) -> UniqueResult<()> {
    for entry in registry.entries() {
        let Some(path) = paths.get(&entry.key) else {
            continue;
        };
        let Some(dotted) = path.dotted() else {
            debug!(key = %entry.key, path = %path, "repeating path, skipping uniqueness lookup");
            continue;
        };
        let Some(value) = path.get(data).and_then(UniqueValue::classify) else {
            continue;
        };

        if cancel.is_cancelled() {
            return Err(UniqueCheckError::Cancelled);
        }

        let query = build_query(scope, &dotted, &value);
        log_event_with_fields(Event::UniqueLookup, &[("key", entry.key.as_str()), ("path", dotted.as_str())]);

        let Some(record) = store.find_one(&query).await? else {
            continue;
        };
        if scope.submission_id == Some(record.id.as_str()) {
            continue;
        }

        log_event_with_fields(
            Event::UniqueConflict,
            &[("key", entry.key.as_str()), ("record", record.id.as_str())],
        );
        return Err(UniqueCheckError::Conflict(FieldError::new(
            dotted,
            RuleKind::Unique,
            format!("{} must be unique.", entry.label),
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unique::store::InMemoryStore;

    fn paths(entries: &[(&str, &str)]) -> HashMap<String, DataPath> {
        entries
            .iter()
            .map(|(k, p)| (k.to_string(), DataPath::parse(p)))
            .collect()
    }

    fn scope<'a>(form: &'a str, id: Option<&'a str>) -> LookupScope<'a> {
        LookupScope {
            form_id: Some(form),
            submission_id: id,
        }
    }

    #[test]
    fn test_build_query_clauses() {
        let query = build_query(&scope("f1", None), "ssn", &UniqueValue::Scalar("1".into()));
        assert_eq!(query.filters.len(), 3);
        assert!(query.filter_for("form").is_some());
        assert!(query.filter_for("deleted").is_some());
        assert!(query.filter_for("data.ssn").is_some());

        let unscoped = build_query(&LookupScope::default(), "ssn", &UniqueValue::Scalar("1".into()));
        assert!(unscoped.filter_for("form").is_none());
    }

    #[tokio::test]
    async fn test_conflict_reports_label() {
        let store = InMemoryStore::new();
        store
            .insert(json!({"_id": "old", "form": "f1", "data": {"ssn": "123-45"}}))
            .await;

        let mut registry = UniquenessRegistry::new();
        registry.register("ssn", "Social Security Number");

        let err = check_all(
            &registry,
            &scope("f1", None),
            &json!({"ssn": "123-45"}),
            &paths(&[("ssn", "ssn")]),
            &store,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        match err {
            UniqueCheckError::Conflict(e) => {
                assert_eq!(e.field_path, "ssn");
                assert_eq!(e.kind, RuleKind::Unique);
                assert_eq!(e.message, "Social Security Number must be unique.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_own_record_and_deleted_records_do_not_conflict() {
        let store = InMemoryStore::new();
        store.insert(json!({"_id": "me", "form": "f1", "data": {"ssn": "1"}})).await;
        store
            .insert(json!({"_id": "gone", "form": "f1", "deleted": 1, "data": {"ssn": "2"}}))
            .await;
        store.insert(json!({"_id": "other", "form": "f2", "data": {"ssn": "2"}})).await;

        let mut registry = UniquenessRegistry::new();
        registry.register("ssn", "SSN");
        let cancel = CancellationToken::new();
        let index = paths(&[("ssn", "ssn")]);

        let own = check_all(&registry, &scope("f1", Some("me")), &json!({"ssn": "1"}), &index, &store, &cancel).await;
        assert!(own.is_ok());

        let deleted = check_all(&registry, &scope("f1", None), &json!({"ssn": "2"}), &index, &store, &cancel).await;
        assert!(deleted.is_ok());
    }

    #[tokio::test]
    async fn test_skips_empty_numeric_and_repeating_values() {
        let store = InMemoryStore::new();
        let mut registry = UniquenessRegistry::new();
        registry.register("a", "A");
        registry.register("n", "N");
        registry.register("row", "Row");
        registry.register("unknown", "Unknown");

        let data = json!({"a": "", "n": 5, "grid": [{"row": "x"}]});
        let index = paths(&[("a", "a"), ("n", "n"), ("row", "grid[].row")]);

        check_all(&registry, &scope("f1", None), &data, &index, &store, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(store.lookup_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_lookup() {
        let store = InMemoryStore::new();
        let mut registry = UniquenessRegistry::new();
        registry.register("a", "A");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = check_all(
            &registry,
            &scope("f1", None),
            &json!({"a": "x"}),
            &paths(&[("a", "a")]),
            &store,
            &cancel,
        )
        .await;
        assert!(matches!(result, Err(UniqueCheckError::Cancelled)));
        assert_eq!(store.lookup_count(), 0);
    }
}
