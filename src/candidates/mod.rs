// src/candidates/mod.rs - Bounded candidate generation over the target snapshot
//
// Tiered lookups keep the work per source record at O(k), k ≪ M: an exact
// probe on unique-identifier fields, an inverted keyword index over name
// tokens, a street probe for addresses, and an opportunistic store
// text-search fallback that degrades gracefully when unsupported. Results
// are unioned, de-duplicated and capped; a full target scan never happens
// per source record.
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::StoreError;
use crate::models::mapping::{FieldMapping, MatchFieldType};
use crate::models::matching::CandidateSet;
use crate::models::record::Record;
use crate::normalize::text::{normalize, tokenize};
use crate::similarity::address::extract_address_components;
use crate::storage::RecordStore;

/// Minimum shared tokens before a keyword hit counts, mirroring the noise
/// floor of token prefiltering.
const MIN_TOKEN_OVERLAP: usize = 2;
/// Tokens whose posting lists exceed this are too generic to discriminate.
const MAX_POSTING_LIST: usize = 2000;
const TEXT_SEARCH_LIMIT: usize = 20;

pub struct CandidateIndex {
    collection: String,
    records: Vec<Arc<Record>>,
    by_id: HashMap<String, usize>,
    /// (target field, normalized value) -> indices, for ExactKey fields.
    exact: HashMap<(String, String), Vec<usize>>,
    /// Inverted keyword index over name-field tokens.
    tokens: HashMap<String, Vec<usize>>,
    /// Street component -> indices, for address fields.
    streets: HashMap<String, Vec<usize>>,
    max_candidates: usize,
}

impl CandidateIndex {
    /// Builds the in-memory index from the target snapshot. One O(M) pass
    /// at task start; lookups afterwards are bounded.
    pub fn build(
        collection: &str,
        target_records: Vec<Record>,
        mappings: &[FieldMapping],
        max_candidates: usize,
    ) -> CandidateIndex {
        let records: Vec<Arc<Record>> = target_records.into_iter().map(Arc::new).collect();
        let mut by_id = HashMap::with_capacity(records.len());
        let mut exact: HashMap<(String, String), Vec<usize>> = HashMap::new();
        let mut tokens: HashMap<String, Vec<usize>> = HashMap::new();
        let mut streets: HashMap<String, Vec<usize>> = HashMap::new();

        for (i, record) in records.iter().enumerate() {
            by_id.insert(record.id.0.clone(), i);
            for mapping in mappings {
                let Some(raw) = record.text(&mapping.target_field) else {
                    continue;
                };
                match mapping.match_type {
                    MatchFieldType::ExactKey => {
                        let key = normalize(&raw);
                        if !key.is_empty() {
                            exact
                                .entry((mapping.target_field.clone(), key))
                                .or_default()
                                .push(i);
                        }
                    }
                    MatchFieldType::Name => {
                        for token in tokenize(&raw) {
                            tokens.entry(token).or_default().push(i);
                        }
                    }
                    MatchFieldType::Address => {
                        let components = extract_address_components(&raw);
                        if let Some(street) = components.street {
                            streets.entry(street).or_default().push(i);
                        }
                    }
                    _ => {}
                }
            }
        }

        for postings in tokens.values_mut() {
            postings.dedup();
        }

        debug!(
            "candidate index built: {} records, {} exact keys, {} tokens, {} streets",
            records.len(),
            exact.len(),
            tokens.len(),
            streets.len()
        );

        CandidateIndex {
            collection: collection.to_string(),
            records,
            by_id,
            exact,
            tokens,
            streets,
            max_candidates,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get_by_id(&self, id: &str) -> Option<Arc<Record>> {
        self.by_id.get(id).map(|i| Arc::clone(&self.records[*i]))
    }

    /// Bounded candidate generation for one source record. The store is
    /// consulted only for the opportunistic text-search tier.
    pub async fn candidates(
        &self,
        source: &Record,
        mappings: &[FieldMapping],
        store: &dyn RecordStore,
    ) -> CandidateSet {
        let mut picked: Vec<usize> = Vec::new();
        let mut seen = vec![false; self.records.len()];
        let add = |i: usize, picked: &mut Vec<usize>, seen: &mut Vec<bool>| {
            if !seen[i] {
                seen[i] = true;
                picked.push(i);
            }
        };

        // Tier 1: exact unique-identifier probe.
        for mapping in mappings {
            if mapping.match_type != MatchFieldType::ExactKey {
                continue;
            }
            if let Some(raw) = source.text(&mapping.source_field) {
                let key = normalize(&raw);
                if key.is_empty() {
                    continue;
                }
                if let Some(hits) = self.exact.get(&(mapping.target_field.clone(), key)) {
                    for &i in hits {
                        add(i, &mut picked, &mut seen);
                    }
                }
            }
        }

        // Tier 2: keyword overlap on name tokens, ranked by overlap count.
        let mut overlap: HashMap<usize, usize> = HashMap::new();
        let mut name_token_count = 0usize;
        for mapping in mappings {
            if mapping.match_type != MatchFieldType::Name {
                continue;
            }
            if let Some(raw) = source.text(&mapping.source_field) {
                for token in tokenize(&raw) {
                    name_token_count += 1;
                    if let Some(postings) = self.tokens.get(&token) {
                        if postings.len() > MAX_POSTING_LIST {
                            continue;
                        }
                        for &i in postings {
                            *overlap.entry(i).or_insert(0) += 1;
                        }
                    }
                }
            }
        }
        let min_overlap = if name_token_count >= MIN_TOKEN_OVERLAP {
            MIN_TOKEN_OVERLAP
        } else {
            1
        };
        let mut ranked: Vec<(usize, usize)> = overlap
            .into_iter()
            .filter(|(_, n)| *n >= min_overlap)
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| {
            self.records[a.0].id.cmp(&self.records[b.0].id)
        }));
        for (i, _) in ranked {
            if picked.len() >= self.max_candidates {
                break;
            }
            add(i, &mut picked, &mut seen);
        }

        // Tier 3: street probe for address fields.
        if picked.len() < self.max_candidates {
            for mapping in mappings {
                if mapping.match_type != MatchFieldType::Address {
                    continue;
                }
                if let Some(raw) = source.text(&mapping.source_field) {
                    if let Some(street) = extract_address_components(&raw).street {
                        if let Some(hits) = self.streets.get(&street) {
                            for &i in hits {
                                if picked.len() >= self.max_candidates {
                                    break;
                                }
                                add(i, &mut picked, &mut seen);
                            }
                        }
                    }
                }
            }
        }

        // Tier 4: opportunistic full-text search, degrading gracefully.
        let mut degraded = false;
        if picked.is_empty() {
            if let Some(query) = text_search_query(source, mappings) {
                match store
                    .text_search(&self.collection, &query, TEXT_SEARCH_LIMIT)
                    .await
                {
                    Ok(docs) => {
                        for doc in docs {
                            if picked.len() >= self.max_candidates {
                                break;
                            }
                            if let Some(id) = doc.get("_id").and_then(|v| v.as_str()) {
                                if let Some(&i) = self.by_id.get(id) {
                                    add(i, &mut picked, &mut seen);
                                }
                            }
                        }
                    }
                    Err(StoreError::TextSearchUnsupported) => {
                        debug!("text search unsupported; candidate tiers exhausted");
                        degraded = true;
                    }
                    Err(e) => {
                        warn!("text search failed, continuing without it: {}", e);
                        degraded = true;
                    }
                }
            }
        }

        picked.truncate(self.max_candidates);
        CandidateSet {
            source_id: source.id.clone(),
            candidates: picked
                .into_iter()
                .map(|i| Arc::clone(&self.records[i]))
                .collect(),
            degraded,
        }
    }
}

/// The most distinctive query text available: the core of the first mapped
/// name field, else the raw name.
fn text_search_query(source: &Record, mappings: &[FieldMapping]) -> Option<String> {
    for mapping in mappings {
        if mapping.match_type == MatchFieldType::Name {
            if let Some(raw) = source.text(&mapping.source_field) {
                let core = crate::normalize::decompose::parse_name(&raw).core_name;
                if !core.is_empty() {
                    return Some(core);
                }
                let normalized = normalize(&raw);
                if !normalized.is_empty() {
                    return Some(normalized);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;

    fn mappings() -> Vec<FieldMapping> {
        vec![
            FieldMapping::new("credit_code", "credit_code", 0.3, MatchFieldType::ExactKey),
            FieldMapping::new("unit_name", "company_name", 0.5, MatchFieldType::Name),
            FieldMapping::new("address", "reg_address", 0.2, MatchFieldType::Address),
        ]
    }

    fn target(id: &str, name: &str, addr: &str) -> Record {
        Record::new("supervision", id)
            .with_text("company_name", name)
            .with_text("reg_address", addr)
    }

    fn targets() -> Vec<Record> {
        vec![
            target("t1", "上海惠民食品厂", "上海市虹口区天宝路828号"),
            target("t2", "上海为民食品厂", "上海市虹口区天宝路881号"),
            target("t3", "北京宏远物流有限公司", "北京市朝阳区建国路1号"),
            target("t4", "上海浦发银行虹口支行", "上海市虹口区四川北路100号"),
        ]
    }

    #[tokio::test]
    async fn test_token_overlap_candidates() {
        let store = MemoryStore::new();
        let index = CandidateIndex::build("supervision_units", targets(), &mappings(), 50);
        let source = Record::new("inspection", "s1")
            .with_text("unit_name", "上海为民食品厂")
            .with_text("address", "虹口区天宝路881号");
        let set = index.candidates(&source, &mappings(), &store).await;
        let ids: Vec<&str> = set.candidates.iter().map(|r| r.id.as_str()).collect();
        assert!(ids.contains(&"t2"), "ids = {:?}", ids);
        // High character overlap puts the near-twin in as well.
        assert!(ids.contains(&"t1"), "ids = {:?}", ids);
        assert!(!ids.contains(&"t3"), "ids = {:?}", ids);
    }

    #[tokio::test]
    async fn test_exact_key_probe() {
        let store = MemoryStore::new();
        let mut rows = targets();
        rows[2] = rows[2]
            .clone()
            .with_text("credit_code", "91310109MA1G5XYZ3Q");
        let index = CandidateIndex::build("supervision_units", rows, &mappings(), 50);
        let source = Record::new("inspection", "s1")
            .with_text("unit_name", "完全无关的名字")
            .with_text("credit_code", "91310109ma1g5xyz3q");
        let set = index.candidates(&source, &mappings(), &store).await;
        let ids: Vec<&str> = set.candidates.iter().map(|r| r.id.as_str()).collect();
        assert!(ids.contains(&"t3"), "ids = {:?}", ids);
    }

    #[tokio::test]
    async fn test_candidate_cap_is_enforced() {
        let store = MemoryStore::new();
        let mut rows = Vec::new();
        for i in 0..100 {
            rows.push(target(&format!("t{:03}", i), "上海为民食品厂", ""));
        }
        let index = CandidateIndex::build("supervision_units", rows, &mappings(), 10);
        let source = Record::new("inspection", "s1").with_text("unit_name", "上海为民食品厂");
        let set = index.candidates(&source, &mappings(), &store).await;
        assert_eq!(set.len(), 10);
    }

    #[tokio::test]
    async fn test_text_search_fallback_and_degradation() {
        // No token overlap at all: tier 4 is the only hope.
        let store = MemoryStore::new();
        let index = CandidateIndex::build("supervision_units", targets(), &mappings(), 50);
        let source = Record::new("inspection", "s1").with_text("unit_name", "浦发银行");
        let set = index.candidates(&source, &mappings(), &store).await;
        // 浦发 tokens overlap with t4 via the keyword tier already, so the
        // set is non-empty either way.
        assert!(!set.is_empty());

        let degraded_store = MemoryStore::without_text_search();
        let lonely = Record::new("inspection", "s2").with_text("unit_name", "毫无交集单位");
        let set = index.candidates(&lonely, &mappings(), &degraded_store).await;
        assert!(set.is_empty());
    }
}
