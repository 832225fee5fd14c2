//! # Document Store
//!
//! Narrow interface to the store holding previously accepted submissions.
//! The engine only ever asks for the first record matching a query.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::errors::StoreResult;
use super::query::StoreQuery;

/// A stored submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Submission id
    pub id: String,

    /// Full stored document (`form`, `data`, `deleted`, ...)
    pub document: Value,
}

/// Trait for submission lookups
#[async_trait]
pub trait DocumentStore: Send + Sync + std::fmt::Debug {
    /// Returns the first record matching every filter of the query.
    async fn find_one(&self, query: &StoreQuery) -> StoreResult<Option<StoredRecord>>;
}

/// In-memory document store
///
/// Records are scanned in insertion order. Counts the lookups it serves.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: RwLock<Vec<StoredRecord>>,
    lookups: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a document, using its `_id` or a fresh id, and returns the id.
    pub async fn insert(&self, document: Value) -> String {
        let id = document
            .get("_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        self.records.write().await.push(StoredRecord {
            id: id.clone(),
            document,
        });
        id
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Number of `find_one` calls served so far
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn find_one(&self, query: &StoreQuery) -> StoreResult<Option<StoredRecord>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let records = self.records.read().await;
        Ok(records.iter().find(|r| query.matches(&r.document)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unique::query::FilterExpr;
    use serde_json::json;

    #[tokio::test]
    async fn test_insert_uses_document_id() {
        let store = InMemoryStore::new();
        let id = store.insert(json!({"_id": "s1", "form": "f1"})).await;
        assert_eq!(id, "s1");

        let generated = store.insert(json!({"form": "f1"})).await;
        assert!(Uuid::parse_str(&generated).is_ok());
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_find_one_returns_first_match() {
        let store = InMemoryStore::new();
        store.insert(json!({"_id": "a", "form": "f1", "data": {"ssn": "1"}})).await;
        store.insert(json!({"_id": "b", "form": "f1", "data": {"ssn": "1"}})).await;

        let query = StoreQuery::new()
            .and(FilterExpr::eq("form", json!("f1")))
            .and(FilterExpr::imatch("data.ssn", "1"));

        let found = store.find_one(&query).await.unwrap();
        assert_eq!(found.map(|r| r.id), Some("a".to_string()));

        let none = StoreQuery::new().and(FilterExpr::eq("form", json!("f2")));
        assert!(store.find_one(&none).await.unwrap().is_none());
        assert_eq!(store.lookup_count(), 2);
    }
}
