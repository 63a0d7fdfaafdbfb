// src/models/matching.rs - Match scores and persisted match results
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::models::record::{Record, RecordId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Normalized unique-identifier equality. The only source of score 1.0.
    Exact,
    /// Structured name decomposition drove the decision (strong core match).
    Structured,
    /// Weighted multi-field blend.
    Fuzzy,
    /// Fuzzy score promoted by shared-attribute corroboration.
    GraphCorroborated,
    /// No qualified candidate.
    None,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Exact => "exact",
            MatchType::Structured => "structured",
            MatchType::Fuzzy => "fuzzy",
            MatchType::GraphCorroborated => "graph_corroborated",
            MatchType::None => "none",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn from_score(match_type: MatchType, score: f64) -> ConfidenceLevel {
        if match_type == MatchType::Exact || score >= 0.95 {
            ConfidenceLevel::High
        } else if score >= 0.85 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    AutoConfirmed,
    PendingReview,
    Unmatched,
}

/// Immutable score for one (source, candidate) pair, with an ordered
/// explanation trail of every applied stage and adjustment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchScore {
    pub candidate_id: RecordId,
    pub final_score: f64,
    pub match_type: MatchType,
    pub per_field_scores: BTreeMap<String, f64>,
    pub explanation: Vec<String>,
    /// Set when the structured-name stage saw a strong core-name agreement
    /// or the graph escalated this pair; used by arbitration tie-breaks.
    pub structurally_corroborated: bool,
    /// Address agreement observed during field blending, for tie-breaks.
    pub address_agreement: Option<f64>,
    /// Legal-person agreement observed during field blending, for tie-breaks.
    pub legal_person_agreement: Option<f64>,
    /// Completeness of the candidate record, for tie-breaks.
    pub target_completeness: f64,
}

impl MatchScore {
    pub fn rejected(candidate_id: RecordId, reason: impl Into<String>) -> MatchScore {
        MatchScore {
            candidate_id,
            final_score: 0.0,
            match_type: MatchType::None,
            per_field_scores: BTreeMap::new(),
            explanation: vec![reason.into()],
            structurally_corroborated: false,
            address_agreement: None,
            legal_person_agreement: None,
            target_completeness: 0.0,
        }
    }

    pub fn is_qualified(&self, threshold: f64) -> bool {
        self.match_type != MatchType::None && self.final_score >= threshold
    }
}

/// Bounded, best-effort superset of plausible matches for one source record.
/// May have false negatives; never produced by a full target scan.
#[derive(Debug, Clone)]
pub struct CandidateSet {
    pub source_id: RecordId,
    pub candidates: Vec<Arc<Record>>,
    /// True when every lookup tier failed and the set is empty for that
    /// reason rather than because nothing overlapped.
    pub degraded: bool,
}

impl CandidateSet {
    pub fn empty(source_id: RecordId) -> CandidateSet {
        CandidateSet {
            source_id,
            candidates: Vec::new(),
            degraded: false,
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Persisted outcome for one source record, keyed by `primary_record_id`.
/// Created on the first attempt, updated by later incremental passes,
/// deleted only by an explicit full reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub primary_record_id: RecordId,
    pub matched_record_id: Option<RecordId>,
    pub match_type: MatchType,
    pub similarity_score: f64,
    pub confidence_level: ConfidenceLevel,
    pub review_status: ReviewStatus,
    pub explanation: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MatchResult {
    pub fn unmatched(primary_record_id: RecordId, explanation: Vec<String>) -> MatchResult {
        let now = Utc::now();
        MatchResult {
            primary_record_id,
            matched_record_id: None,
            match_type: MatchType::None,
            similarity_score: 0.0,
            confidence_level: ConfidenceLevel::Low,
            review_status: ReviewStatus::Unmatched,
            explanation,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn from_score(primary_record_id: RecordId, score: &MatchScore) -> MatchResult {
        let now = Utc::now();
        let confidence = ConfidenceLevel::from_score(score.match_type, score.final_score);
        let review_status = match confidence {
            ConfidenceLevel::High => ReviewStatus::AutoConfirmed,
            _ => ReviewStatus::PendingReview,
        };
        MatchResult {
            primary_record_id,
            matched_record_id: Some(score.candidate_id.clone()),
            match_type: score.match_type,
            similarity_score: score.final_score,
            confidence_level: confidence,
            review_status,
            explanation: score.explanation.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Equality that ignores timestamps, used by incremental passes to
    /// decide whether a stored document actually needs rewriting.
    pub fn same_outcome(&self, other: &MatchResult) -> bool {
        self.matched_record_id == other.matched_record_id
            && self.match_type == other.match_type
            && self.review_status == other.review_status
    }

    /// The stored document carries an `_id` member equal to
    /// `primary_record_id` so that id-keyed find filters can address it.
    pub fn to_document(&self) -> Value {
        let mut doc = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(ref mut obj) = doc {
            obj.insert(
                "_id".to_string(),
                Value::String(self.primary_record_id.0.clone()),
            );
        }
        doc
    }

    pub fn from_document(doc: &Value) -> Option<MatchResult> {
        serde_json::from_value(doc.clone()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_bands() {
        assert_eq!(
            ConfidenceLevel::from_score(MatchType::Exact, 1.0),
            ConfidenceLevel::High
        );
        assert_eq!(
            ConfidenceLevel::from_score(MatchType::Fuzzy, 0.9),
            ConfidenceLevel::Medium
        );
        assert_eq!(
            ConfidenceLevel::from_score(MatchType::Fuzzy, 0.8),
            ConfidenceLevel::Low
        );
    }

    #[test]
    fn test_result_document_round_trip() {
        let score = MatchScore {
            candidate_id: RecordId::new("t1"),
            final_score: 0.91,
            match_type: MatchType::Structured,
            per_field_scores: BTreeMap::new(),
            explanation: vec!["structured: 0.91".to_string()],
            structurally_corroborated: true,
            address_agreement: Some(0.8),
            legal_person_agreement: None,
            target_completeness: 0.7,
        };
        let result = MatchResult::from_score(RecordId::new("s1"), &score);
        let doc = result.to_document();
        let back = MatchResult::from_document(&doc).unwrap();
        assert!(back.same_outcome(&result));
        assert_eq!(back.matched_record_id, Some(RecordId::new("t1")));
    }

    #[test]
    fn test_stored_document_is_id_addressable() {
        let result = MatchResult::unmatched(RecordId::new("s7"), vec![]);
        let doc = result.to_document();
        assert_eq!(doc.get("_id").and_then(Value::as_str), Some("s7"));
    }

    #[test]
    fn test_same_outcome_ignores_timestamps() {
        let a = MatchResult::unmatched(RecordId::new("s1"), vec![]);
        let mut b = a.clone();
        b.updated_at = b.updated_at + chrono::Duration::seconds(30);
        assert!(a.same_outcome(&b));
    }
}
