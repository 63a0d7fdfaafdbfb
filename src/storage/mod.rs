// src/storage/mod.rs - The read/write contract the core consumes
//
// Exactly the operations of the core contract: filtered finds, an optional
// text search used opportunistically with graceful degradation, and an
// atomic replace-or-insert upsert keyed by record id. `count` and `clear`
// exist for progress totals and the explicit full reset.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;

/// Equality/paging filter understood by every backend. Documents always
/// come back sorted by `_id` ascending, which is what makes
/// `last_processed_id` resumption deterministic.
#[derive(Debug, Clone, Default)]
pub struct FindFilter {
    pub eq: Vec<(String, Value)>,
    pub id_after: Option<String>,
    pub id_in: Option<Vec<String>>,
}

impl FindFilter {
    pub fn all() -> FindFilter {
        FindFilter::default()
    }

    pub fn field_eq(field: impl Into<String>, value: Value) -> FindFilter {
        FindFilter {
            eq: vec![(field.into(), value)],
            ..Default::default()
        }
    }

    pub fn after(id: Option<&str>) -> FindFilter {
        FindFilter {
            id_after: id.map(|s| s.to_string()),
            ..Default::default()
        }
    }

    pub fn ids(ids: Vec<String>) -> FindFilter {
        FindFilter {
            id_in: Some(ids),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub inserted: bool,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find(
        &self,
        collection: &str,
        filter: &FindFilter,
        limit: Option<usize>,
        skip: usize,
    ) -> Result<Vec<Value>, StoreError>;

    async fn count(&self, collection: &str, filter: &FindFilter) -> Result<usize, StoreError>;

    /// Substring/full-text lookup. Backends may return
    /// `StoreError::TextSearchUnsupported`; callers degrade instead of
    /// failing.
    async fn text_search(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Value>, StoreError>;

    /// Atomic replace-or-insert keyed by `_id`.
    async fn upsert(
        &self,
        collection: &str,
        key: &str,
        document: Value,
    ) -> Result<UpsertOutcome, StoreError>;

    /// Explicit full reset of a collection (Full mode only).
    async fn clear(&self, collection: &str) -> Result<(), StoreError>;
}
