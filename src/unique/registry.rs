//! Unique field registry and value classification

use serde_json::Value;

use super::query::FilterExpr;

/// A field registered for a uniqueness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueEntry {
    pub key: String,
    /// Name used in the conflict message
    pub label: String,
}

/// Unique fields in registration (tree) order.
///
/// Registering a key again keeps its original position and replaces the
/// label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UniquenessRegistry {
    entries: Vec<UniqueEntry>,
}

impl UniquenessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, key: &str, label: &str) {
        match self.entries.iter_mut().find(|e| e.key == key) {
            Some(entry) => entry.label = label.to_string(),
            None => self.entries.push(UniqueEntry {
                key: key.to_string(),
                label: label.to_string(),
            }),
        }
    }

    pub fn entries(&self) -> &[UniqueEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Shape of a submitted unique value, deciding how it is looked up.
#[derive(Debug, Clone, PartialEq)]
pub enum UniqueValue {
    /// Text, matched case-insensitively
    Scalar(String),
    /// Address picked from a place search, matched on its place id
    PlaceReference { place_id: String },
    /// List, matched when a stored list holds every element
    List(Vec<Value>),
    /// Any other object, matched structurally
    Document(Value),
}

impl UniqueValue {
    /// Classifies a submitted value. Values without content (null, empty
    /// text, lists or objects) are never looked up, and neither are numbers
    /// or booleans.
    pub fn classify(value: &Value) -> Option<Self> {
        match value {
            Value::Null | Value::Bool(_) | Value::Number(_) => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(UniqueValue::Scalar(s.clone())),
            Value::Array(items) if items.is_empty() => None,
            Value::Array(items) => Some(UniqueValue::List(items.clone())),
            Value::Object(map) if map.is_empty() => None,
            Value::Object(map) => match (map.get("address_components"), map.get("place_id")) {
                (Some(_), Some(Value::String(place_id))) => Some(UniqueValue::PlaceReference {
                    place_id: place_id.clone(),
                }),
                _ => Some(UniqueValue::Document(value.clone())),
            },
        }
    }

    /// Store filter on the submission's `data` for a field at `dotted`.
    pub fn filter(&self, dotted: &str) -> FilterExpr {
        let field = format!("data.{}", dotted);
        match self {
            UniqueValue::Scalar(text) => FilterExpr::imatch(field, text),
            UniqueValue::PlaceReference { place_id } => {
                FilterExpr::imatch(format!("{}.place_id", field), place_id)
            }
            UniqueValue::List(items) => FilterExpr::all(field, items.clone()),
            UniqueValue::Document(doc) => FilterExpr::eq(field, doc.clone()),
        }
    }
}
