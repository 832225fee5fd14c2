//! Uniqueness checks against stored submissions
//!
//! Unique fields are registered while the schema is compiled. Before
//! structural validation their submitted values are looked up one at a
//! time, in registration order, and the first conflicting record rejects
//! the submission.
//!
//! # Design Principles
//!
//! - Lookups are strictly sequential; no lookup is issued after a conflict
//! - Fields without content are never looked up
//! - Soft-deleted records never conflict

mod checker;
mod errors;
mod query;
mod registry;
mod store;

pub use checker::{build_query, check_all, LookupScope};
pub use errors::{StoreError, StoreResult, UniqueCheckError, UniqueResult};
pub use query::{FilterExpr, FilterOperator, StoreQuery};
pub use registry::{UniqueEntry, UniqueValue, UniquenessRegistry};
pub use store::{DocumentStore, InMemoryStore, StoredRecord};
