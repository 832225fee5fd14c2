//! # Store Query Expressions
//!
//! Conjunctions of field filters addressed by dotted paths
//! (`data.address.place_id`). Stores may translate a query into their own
//! language; [`StoreQuery::matches`] is the reference evaluation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Filter operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    /// Equals
    #[serde(rename = "eq")]
    Eq,

    /// Case-insensitive exact string match
    #[serde(rename = "imatch")]
    IMatch,

    /// List containing every given element, in any order
    #[serde(rename = "all")]
    All,

    /// Is null (or missing) / is not null
    #[serde(rename = "is")]
    Is,
}

impl FilterOperator {
    /// Get the operator string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "eq",
            FilterOperator::IMatch => "imatch",
            FilterOperator::All => "all",
            FilterOperator::Is => "is",
        }
    }
}

/// A filter expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterExpr {
    /// Dotted path of the field to filter on
    pub field: String,

    /// Comparison operator
    pub operator: FilterOperator,

    /// Value to compare against
    pub value: Value,
}

impl FilterExpr {
    /// Create a new filter expression
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// Create an equality filter
    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOperator::Eq, value)
    }

    /// Create a case-insensitive exact match filter
    pub fn imatch(field: impl Into<String>, text: &str) -> Self {
        Self::new(field, FilterOperator::IMatch, Value::String(text.to_string()))
    }

    /// Create a "contains all" filter
    pub fn all(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(field, FilterOperator::All, Value::Array(values))
    }

    /// Create an "is null" filter; missing fields match too
    pub fn is_null(field: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::Is, Value::Null)
    }

    /// Check if a document matches this filter
    pub fn matches(&self, doc: &Value) -> bool {
        let field_value = match resolve_path(doc, &self.field) {
            Some(v) => v,
            None => return self.operator == FilterOperator::Is && self.value.is_null(),
        };

        match self.operator {
            FilterOperator::Eq => field_value == &self.value,
            FilterOperator::IMatch => match (field_value.as_str(), self.value.as_str()) {
                (Some(actual), Some(expected)) => actual.to_lowercase() == expected.to_lowercase(),
                _ => false,
            },
            FilterOperator::All => {
                let Some(wanted) = self.value.as_array() else {
                    return false;
                };
                if wanted.is_empty() {
                    return false;
                }
                match field_value.as_array() {
                    Some(actual) => wanted.iter().all(|w| actual.contains(w)),
                    None => wanted.iter().all(|w| w == field_value),
                }
            }
            FilterOperator::Is => {
                if self.value.is_null() {
                    field_value.is_null()
                } else {
                    !field_value.is_null()
                }
            }
        }
    }
}

/// Resolves a dotted path through nested objects
fn resolve_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(doc, |current, segment| current.as_object()?.get(segment))
}

/// A set of filters combined with AND logic
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreQuery {
    pub filters: Vec<FilterExpr>,
}

impl StoreQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(mut self, filter: FilterExpr) -> Self {
        self.filters.push(filter);
        self
    }

    /// Filter on a field, if any
    pub fn filter_for(&self, field: &str) -> Option<&FilterExpr> {
        self.filters.iter().find(|f| f.field == field)
    }

    /// Check if a document matches all filters
    pub fn matches(&self, doc: &Value) -> bool {
        self.filters.iter().all(|f| f.matches(doc))
    }
}
