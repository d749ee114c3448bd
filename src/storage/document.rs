//! Contract of the indexed key/value document store.
//! The store only answers exact-match lookups on attributes that were declared
//! through `ensure_indexes`; anything richer is the caller's business.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::XmailResult;

/// A stored document: `(entity, key)` addresses it, `body` is the whole record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub entity: String,
    pub key: String,
    pub body: JsonValue,
}

impl Record {
    pub fn new(entity: impl Into<String>, key: impl Into<String>, body: JsonValue) -> Self {
        Self { entity: entity.into(), key: key.into(), body }
    }

    /// String value of a top-level attribute, as the store indexes it.
    pub fn attribute(&self, attribute: &str) -> Option<&str> {
        self.body.get(attribute).and_then(|v| v.as_str())
    }
}

/// One secondary index: `(entity, attribute, unique)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexDeclaration {
    pub entity: String,
    pub attribute: String,
    pub unique: bool,
}

impl IndexDeclaration {
    pub fn unique(entity: &str, attribute: &str) -> Self {
        Self { entity: entity.to_string(), attribute: attribute.to_string(), unique: true }
    }
    pub fn non_unique(entity: &str, attribute: &str) -> Self {
        Self { entity: entity.to_string(), attribute: attribute.to_string(), unique: false }
    }
}

/// What `ensure_indexes` did for each declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub created: Vec<IndexDeclaration>,
    pub updated: Vec<IndexDeclaration>,
    pub unchanged: Vec<IndexDeclaration>,
}

impl IndexReport {
    pub fn is_noop(&self) -> bool { self.created.is_empty() && self.updated.is_empty() }
}

/// Capability consumed from the external document store.
///
/// Every method may fail with `XmailError::StoreUnavailable` on transport
/// problems; implementations never retry. Absence is `None`/empty, not an error.
pub trait DocumentStore: Send + Sync {
    /// Insert or fully overwrite the record stored under `(entity, key)`.
    fn put(&self, record: Record) -> XmailResult<Record>;
    fn get(&self, entity: &str, key: &str) -> XmailResult<Option<Record>>;
    /// Returns whether a record was removed.
    fn delete(&self, entity: &str, key: &str) -> XmailResult<bool>;
    /// Exact-match lookup through a declared index, oldest record first.
    /// Querying an undeclared index is a programming error.
    fn find_by_indexed_attribute(&self, entity: &str, attribute: &str, value: &str) -> XmailResult<Vec<Record>>;
    /// Create-if-absent for every declaration. Safe to call repeatedly and concurrently.
    fn ensure_indexes(&self, schema: &[IndexDeclaration]) -> XmailResult<IndexReport>;
    /// Current index declarations, sorted.
    fn indexes(&self) -> XmailResult<Vec<IndexDeclaration>>;
}
