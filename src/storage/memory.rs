// src/storage/memory.rs - In-memory store for tests and small runs
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::models::record::Record;
use crate::storage::{FindFilter, RecordStore, UpsertOutcome};

/// BTreeMap per collection keeps documents ordered by id, matching the
/// contract's ascending-id find semantics without extra sorting.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Value>>>,
    upsert_calls: AtomicUsize,
    /// When non-zero, the next N upserts fail; exercises retry/backoff.
    upsert_failures: AtomicUsize,
    text_search_enabled: bool,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore {
            text_search_enabled: true,
            ..Default::default()
        }
    }

    /// A store whose text-search tier reports unsupported, for degradation
    /// tests.
    pub fn without_text_search() -> MemoryStore {
        MemoryStore::default()
    }

    pub async fn seed_record(&self, collection: &str, record: &Record) {
        let mut guard = self.collections.write().await;
        guard
            .entry(collection.to_string())
            .or_default()
            .insert(record.id.0.clone(), record.to_document());
    }

    pub async fn seed_records(&self, collection: &str, records: &[Record]) {
        for r in records {
            self.seed_record(collection, r).await;
        }
    }

    /// Total number of successful upsert calls, used by incremental
    /// idempotence tests.
    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    pub fn inject_upsert_failures(&self, n: usize) {
        self.upsert_failures.store(n, Ordering::SeqCst);
    }

    fn matches(doc: &Value, filter: &FindFilter) -> bool {
        let id = doc.get("_id").and_then(|v| v.as_str()).unwrap_or("");
        if let Some(after) = &filter.id_after {
            if id <= after.as_str() {
                return false;
            }
        }
        if let Some(ids) = &filter.id_in {
            if !ids.iter().any(|i| i == id) {
                return false;
            }
        }
        for (field, expected) in &filter.eq {
            if doc.get(field) != Some(expected) {
                return false;
            }
        }
        true
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn find(
        &self,
        collection: &str,
        filter: &FindFilter,
        limit: Option<usize>,
        skip: usize,
    ) -> Result<Vec<Value>, StoreError> {
        let guard = self.collections.read().await;
        let docs = match guard.get(collection) {
            Some(d) => d,
            None => return Ok(Vec::new()),
        };
        let iter = docs
            .values()
            .filter(|doc| Self::matches(doc, filter))
            .skip(skip);
        let out: Vec<Value> = match limit {
            Some(n) => iter.take(n).cloned().collect(),
            None => iter.cloned().collect(),
        };
        Ok(out)
    }

    async fn count(&self, collection: &str, filter: &FindFilter) -> Result<usize, StoreError> {
        let guard = self.collections.read().await;
        Ok(guard
            .get(collection)
            .map(|docs| docs.values().filter(|d| Self::matches(d, filter)).count())
            .unwrap_or(0))
    }

    async fn text_search(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Value>, StoreError> {
        if !self.text_search_enabled {
            return Err(StoreError::TextSearchUnsupported);
        }
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let guard = self.collections.read().await;
        let docs = match guard.get(collection) {
            Some(d) => d,
            None => return Ok(Vec::new()),
        };
        let out: Vec<Value> = docs
            .values()
            .filter(|doc| {
                doc.as_object().map_or(false, |obj| {
                    obj.values()
                        .filter_map(|v| v.as_str())
                        .any(|s| s.contains(query))
                })
            })
            .take(limit)
            .cloned()
            .collect();
        Ok(out)
    }

    async fn upsert(
        &self,
        collection: &str,
        key: &str,
        document: Value,
    ) -> Result<UpsertOutcome, StoreError> {
        let pending = self.upsert_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.upsert_failures.store(pending - 1, Ordering::SeqCst);
            return Err(StoreError::Backend("injected upsert failure".into()));
        }
        let mut guard = self.collections.write().await;
        let docs = guard.entry(collection.to_string()).or_default();
        let inserted = docs.insert(key.to_string(), document).is_none();
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        Ok(UpsertOutcome { inserted })
    }

    async fn clear(&self, collection: &str) -> Result<(), StoreError> {
        let mut guard = self.collections.write().await;
        guard.remove(collection);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record::Record;

    #[tokio::test]
    async fn test_find_is_id_ordered_and_paged() {
        let store = MemoryStore::new();
        for id in ["c", "a", "b", "d"] {
            store
                .seed_record("units", &Record::new("t", id).with_text("unit_name", "x"))
                .await;
        }
        let all = store
            .find("units", &FindFilter::all(), None, 0)
            .await
            .unwrap();
        let ids: Vec<&str> = all
            .iter()
            .map(|d| d.get("_id").unwrap().as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);

        let page = store
            .find("units", &FindFilter::after(Some("b")), Some(1), 0)
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].get("_id").unwrap().as_str().unwrap(), "c");
    }

    #[tokio::test]
    async fn test_upsert_counts_and_replaces() {
        let store = MemoryStore::new();
        let doc = serde_json::json!({"_id": "r1", "v": 1});
        let first = store.upsert("results", "r1", doc.clone()).await.unwrap();
        assert!(first.inserted);
        let second = store.upsert("results", "r1", doc).await.unwrap();
        assert!(!second.inserted);
        assert_eq!(store.upsert_calls(), 2);
    }

    #[tokio::test]
    async fn test_text_search_degradation() {
        let store = MemoryStore::without_text_search();
        let err = store.text_search("units", "天宝", 10).await.unwrap_err();
        assert!(matches!(err, StoreError::TextSearchUnsupported));
    }

    #[tokio::test]
    async fn test_injected_failures_expire() {
        let store = MemoryStore::new();
        store.inject_upsert_failures(1);
        let doc = serde_json::json!({"_id": "r1"});
        assert!(store.upsert("results", "r1", doc.clone()).await.is_err());
        assert!(store.upsert("results", "r1", doc).await.is_ok());
    }
}
