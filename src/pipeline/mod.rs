// src/pipeline/mod.rs - Staged scoring for one (source, candidate) pair
//
// Stage order is fixed: exact identifier, structured name, weighted field
// blend, bounded enhancement, hierarchical gate, graph escalation. Every
// adjustment appends to the explanation trail so a reviewer can replay the
// decision.

pub mod cache;
pub mod stages;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::graph::{is_legal_person_field, GraphIndex};
use crate::models::mapping::{FieldMapping, MatchConfig, MatchFieldType};
use crate::models::matching::{MatchScore, MatchType};
use crate::models::record::Record;
use crate::normalize::decompose::NameStructure;
use crate::normalize::dicts::BUSINESS_CONFLICTS;
use crate::normalize::text::normalize;
use crate::similarity::{score_field, string_similarity};

use cache::PipelineCache;
use stages::{default_stages, StageKind};

const REGION_WEIGHT: f64 = 0.10;
const BUSINESS_WEIGHT: f64 = 0.15;
const COMPANY_WEIGHT: f64 = 0.10;
/// Core agreement at or above this marks the pair structured rather than
/// plain fuzzy.
const STRUCTURED_CORE_FLOOR: f64 = 0.9;
/// Name score from which an address conflict starts capping.
const ADDRESS_CONFLICT_NAME_FLOOR: f64 = 0.85;

/// Outcome of the structured-name stage, carried into later stages.
struct NameOutcome {
    score: f64,
    core_similarity: Option<f64>,
    notes: Vec<String>,
}

pub struct ScoringPipeline {
    config: MatchConfig,
    stages: Vec<StageKind>,
    cache: PipelineCache,
    graph: Option<Arc<GraphIndex>>,
}

impl ScoringPipeline {
    pub fn new(config: MatchConfig) -> ScoringPipeline {
        let cache = PipelineCache::new(config.cache_capacity);
        ScoringPipeline {
            config,
            stages: default_stages(),
            cache,
            graph: None,
        }
    }

    pub fn with_graph(mut self, graph: Arc<GraphIndex>) -> ScoringPipeline {
        self.graph = Some(graph);
        self
    }

    pub fn cache_hit_rate(&self) -> f64 {
        self.cache.hit_rate()
    }

    /// Scores one pair through every stage. Pure apart from the
    /// decomposition cache; identical inputs always yield identical scores.
    pub fn score_pair(
        &self,
        source: &Record,
        candidate: &Record,
        mappings: &[FieldMapping],
    ) -> MatchScore {
        let mut explanation: Vec<String> = Vec::new();
        let mut name_outcome: Option<NameOutcome> = None;
        let mut per_field_scores: BTreeMap<String, f64> = BTreeMap::new();
        let mut address_agreement: Option<f64> = None;
        let mut legal_person_agreement: Option<f64> = None;
        let mut score = 0.0;
        let mut structurally_corroborated = false;
        let mut match_type = MatchType::Fuzzy;

        for stage in &self.stages {
            match stage {
                StageKind::ExactKey => {
                    if let Some(field) = self.exact_key_hit(source, candidate, mappings) {
                        let mut per_field = BTreeMap::new();
                        per_field.insert(field.clone(), 1.0);
                        return MatchScore {
                            candidate_id: candidate.id.clone(),
                            final_score: 1.0,
                            match_type: MatchType::Exact,
                            per_field_scores: per_field,
                            explanation: vec![format!(
                                "exact identifier agreement on {}",
                                field
                            )],
                            structurally_corroborated: true,
                            address_agreement: None,
                            legal_person_agreement: None,
                            target_completeness: candidate.completeness(),
                        };
                    }
                }
                StageKind::StructuredName => {
                    name_outcome = self.structured_name(source, candidate, mappings);
                    if let Some(outcome) = &name_outcome {
                        explanation.extend(outcome.notes.iter().cloned());
                    }
                }
                StageKind::FieldBlend => {
                    let mut weight_sum = 0.0;
                    let mut acc = 0.0;
                    for mapping in mappings {
                        let field_score = match mapping.match_type {
                            MatchFieldType::Name => {
                                let both = source.text(&mapping.source_field).is_some()
                                    && candidate.text(&mapping.target_field).is_some();
                                match (&name_outcome, both) {
                                    (Some(outcome), true) => Some(outcome.score),
                                    _ => None,
                                }
                            }
                            _ => score_field(
                                source.field(&mapping.source_field),
                                candidate.field(&mapping.target_field),
                                mapping.match_type,
                                &self.config,
                            ),
                        };
                        let Some(s) = field_score else { continue };
                        per_field_scores.insert(mapping.source_field.clone(), s);
                        weight_sum += mapping.weight;
                        acc += mapping.weight * s;
                        if mapping.match_type == MatchFieldType::Address {
                            address_agreement = Some(s);
                        }
                        if mapping.match_type == MatchFieldType::Text
                            && (is_legal_person_field(&mapping.source_field)
                                || is_legal_person_field(&mapping.target_field))
                        {
                            legal_person_agreement = Some(s);
                        }
                    }
                    if weight_sum <= 0.0 {
                        return MatchScore::rejected(
                            candidate.id.clone(),
                            "no mapped field carried signal on both sides",
                        );
                    }
                    score = acc / weight_sum;
                    explanation.push(format!(
                        "field blend over {} fields: {:.3}",
                        per_field_scores.len(),
                        score
                    ));
                }
                StageKind::Enhancement => {
                    let core = name_outcome.as_ref().and_then(|o| o.core_similarity);
                    if let Some(core_sim) = core {
                        if core_sim >= self.config.core_boost_floor {
                            score = (score * self.config.core_boost_factor)
                                .min(self.config.fuzzy_ceiling);
                            structurally_corroborated = true;
                            explanation.push(format!(
                                "core name agreement {:.3} boosts score to {:.3}",
                                core_sim, score
                            ));
                        }
                    }
                    let name_score = name_outcome.as_ref().map(|o| o.score);
                    if let (Some(name), Some(addr)) = (name_score, address_agreement) {
                        if name >= ADDRESS_CONFLICT_NAME_FLOOR
                            && addr < self.config.address_conflict_floor
                            && score > self.config.address_conflict_cap
                        {
                            score = self.config.address_conflict_cap;
                            explanation.push(format!(
                                "address disagreement {:.3} caps score at {:.2}",
                                addr, self.config.address_conflict_cap
                            ));
                        }
                    }
                    if let Some(core_sim) = core {
                        if core_sim < self.config.core_strict_floor {
                            score = (score * self.config.core_strict_penalty)
                                .min(self.config.core_strict_cap);
                            explanation.push(format!(
                                "weak core agreement {:.3} penalizes score to {:.3}",
                                core_sim, score
                            ));
                        }
                    }
                }
                StageKind::HierarchicalGate => {
                    let primaries: Vec<&FieldMapping> =
                        mappings.iter().filter(|m| m.is_primary).collect();
                    if primaries.len() < 2 {
                        continue;
                    }
                    for mapping in primaries {
                        let has_value = source.text(&mapping.source_field).is_some()
                            || candidate.text(&mapping.target_field).is_some();
                        if !has_value {
                            continue;
                        }
                        match per_field_scores.get(&mapping.source_field) {
                            Some(s) if *s >= mapping.threshold => {}
                            Some(s) => {
                                return MatchScore::rejected(
                                    candidate.id.clone(),
                                    format!(
                                        "primary field {} scored {:.3}, below its floor {:.2}",
                                        mapping.source_field, s, mapping.threshold
                                    ),
                                );
                            }
                            None => {
                                return MatchScore::rejected(
                                    candidate.id.clone(),
                                    format!(
                                        "primary field {} has no value on one side",
                                        mapping.source_field
                                    ),
                                );
                            }
                        }
                    }
                }
                StageKind::GraphEscalation => {
                    let Some(graph) = &self.graph else { continue };
                    if score < self.config.graph_band_low
                        || score >= self.config.graph_band_high
                    {
                        continue;
                    }
                    let corroboration = graph.score(
                        &GraphIndex::unit_key(source),
                        &GraphIndex::unit_key(candidate),
                    );
                    if corroboration >= self.config.graph_min_corroboration {
                        score = (score + corroboration * self.config.graph_max_boost)
                            .min(self.config.graph_band_high);
                        structurally_corroborated = true;
                        match_type = MatchType::GraphCorroborated;
                        explanation.push(format!(
                            "shared attributes corroborate at {:.3}, score raised to {:.3}",
                            corroboration, score
                        ));
                    }
                }
            }
        }

        score = score.clamp(0.0, self.config.fuzzy_ceiling);
        if match_type != MatchType::GraphCorroborated {
            let core = name_outcome.as_ref().and_then(|o| o.core_similarity);
            match_type = match core {
                Some(c) if c >= STRUCTURED_CORE_FLOOR => MatchType::Structured,
                _ => MatchType::Fuzzy,
            };
        }

        MatchScore {
            candidate_id: candidate.id.clone(),
            final_score: score,
            match_type,
            per_field_scores,
            explanation,
            structurally_corroborated,
            address_agreement,
            legal_person_agreement,
            target_completeness: candidate.completeness(),
        }
    }

    /// First exact-identifier mapping where both sides agree after
    /// normalization.
    fn exact_key_hit(
        &self,
        source: &Record,
        candidate: &Record,
        mappings: &[FieldMapping],
    ) -> Option<String> {
        for mapping in mappings {
            if mapping.match_type != MatchFieldType::ExactKey {
                continue;
            }
            let (Some(a), Some(b)) = (
                source.text(&mapping.source_field),
                candidate.text(&mapping.target_field),
            ) else {
                continue;
            };
            let (na, nb) = (normalize(&a), normalize(&b));
            if !na.is_empty() && na == nb {
                return Some(mapping.source_field.clone());
            }
        }
        None
    }

    /// Component-weighted comparison of decomposed names. `None` when no
    /// name mapping has values on both sides.
    fn structured_name(
        &self,
        source: &Record,
        candidate: &Record,
        mappings: &[FieldMapping],
    ) -> Option<NameOutcome> {
        let mapping = mappings
            .iter()
            .find(|m| m.match_type == MatchFieldType::Name)?;
        let a = source.text(&mapping.source_field)?;
        let b = candidate.text(&mapping.target_field)?;
        let sa = self.cache.decompose(&a);
        let sb = self.cache.decompose(&b);
        Some(self.compare_structures(&sa, &sb, &a, &b))
    }

    fn compare_structures(
        &self,
        a: &NameStructure,
        b: &NameStructure,
        raw_a: &str,
        raw_b: &str,
    ) -> NameOutcome {
        let phonetic = self.config.phonetic_channel;
        let mut notes = Vec::new();

        // Degenerate parses fall back to a whole-string comparison.
        if a.core_name.is_empty() || b.core_name.is_empty() {
            let score = string_similarity(raw_a, raw_b, phonetic);
            notes.push(format!("unstructured name comparison: {:.3}", score));
            return NameOutcome {
                score,
                core_similarity: None,
                notes,
            };
        }

        let core = string_similarity(&a.core_name, &b.core_name, phonetic);
        let mut weight_sum = self.config.core_name_weight;
        let mut acc = self.config.core_name_weight * core;

        if !a.region.is_empty() && !b.region.is_empty() {
            let s = if a.region == b.region {
                1.0
            } else {
                string_similarity(&a.region, &b.region, phonetic)
            };
            weight_sum += REGION_WEIGHT;
            acc += REGION_WEIGHT * s;
        }
        if !a.business_type.is_empty() && !b.business_type.is_empty() {
            let s = if business_conflict(&a.business_type, &b.business_type) {
                notes.push(format!(
                    "incompatible business types {} / {}",
                    a.business_type, b.business_type
                ));
                0.0
            } else if a.business_type == b.business_type {
                1.0
            } else {
                string_similarity(&a.business_type, &b.business_type, phonetic)
            };
            weight_sum += BUSINESS_WEIGHT;
            acc += BUSINESS_WEIGHT * s;
        }
        if !a.company_type.is_empty() && !b.company_type.is_empty() {
            let s = if a.company_type == b.company_type { 1.0 } else { 0.5 };
            weight_sum += COMPANY_WEIGHT;
            acc += COMPANY_WEIGHT * s;
        }

        let score = acc / weight_sum;
        notes.push(format!(
            "structured name comparison: core {:.3}, overall {:.3}",
            core, score
        ));
        NameOutcome {
            score,
            core_similarity: Some(core),
            notes,
        }
    }
}

fn business_conflict(a: &str, b: &str) -> bool {
    BUSINESS_CONFLICTS
        .iter()
        .any(|(x, y)| (a == *x && b == *y) || (a == *y && b == *x))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::mapping::FieldMapping;

    fn mappings() -> Vec<FieldMapping> {
        vec![
            FieldMapping::new("credit_code", "credit_code", 0.0, MatchFieldType::ExactKey),
            FieldMapping::new("unit_name", "company_name", 0.6, MatchFieldType::Name),
            FieldMapping::new("address", "reg_address", 0.4, MatchFieldType::Address),
        ]
    }

    fn source(name: &str, addr: &str) -> Record {
        Record::new("inspection", "s1")
            .with_text("unit_name", name)
            .with_text("address", addr)
    }

    fn target(id: &str, name: &str, addr: &str) -> Record {
        Record::new("supervision", id)
            .with_text("company_name", name)
            .with_text("reg_address", addr)
    }

    #[test]
    fn test_exact_key_short_circuits_to_one() {
        let pipeline = ScoringPipeline::new(MatchConfig::default());
        let s = source("完全不同的名字甲", "")
            .with_text("credit_code", "91310109MA1G5XYZ3Q");
        let t = target("t1", "完全不同的名字乙", "")
            .with_text("credit_code", "91310109ma1g5xyz3q");
        let score = pipeline.score_pair(&s, &t, &mappings());
        assert_eq!(score.final_score, 1.0);
        assert_eq!(score.match_type, MatchType::Exact);
    }

    #[test]
    fn test_fuzzy_never_reaches_one() {
        let pipeline = ScoringPipeline::new(MatchConfig::default());
        let s = source("上海为民食品厂", "上海市虹口区天宝路881号");
        let t = target("t1", "上海为民食品厂", "上海市虹口区天宝路881号");
        let score = pipeline.score_pair(&s, &t, &mappings());
        assert!(score.final_score >= 0.9, "score = {}", score.final_score);
        assert!(score.final_score <= 0.99, "score = {}", score.final_score);
        assert_ne!(score.match_type, MatchType::Exact);
    }

    #[test]
    fn test_weak_core_is_penalized_and_capped() {
        // Same region, business and legal form; cores 为民 and 惠民 differ.
        let pipeline = ScoringPipeline::new(MatchConfig::default());
        let s = source("上海为民食品厂", "上海市虹口区天宝路881号");
        let t = target("t1", "上海惠民食品厂", "上海市虹口区天宝路828号");
        let score = pipeline.score_pair(&s, &t, &mappings());
        assert!(score.final_score <= 0.75, "score = {}", score.final_score);
        assert!(score
            .explanation
            .iter()
            .any(|e| e.contains("weak core agreement")));
    }

    #[test]
    fn test_synonym_folded_names_score_high() {
        let pipeline = ScoringPipeline::new(MatchConfig::default());
        let s = source("上海浦东发展银行", "");
        let t = target("t1", "上海浦发银行", "");
        let score = pipeline.score_pair(&s, &t, &mappings());
        assert!(score.final_score > 0.9, "score = {}", score.final_score);
    }

    #[test]
    fn test_address_conflict_caps_high_name_score() {
        let pipeline = ScoringPipeline::new(MatchConfig::default());
        let name_heavy = vec![
            FieldMapping::new("unit_name", "company_name", 0.9, MatchFieldType::Name),
            FieldMapping::new("address", "reg_address", 0.1, MatchFieldType::Address),
        ];
        let s = source("上海为民食品厂", "上海市虹口区天宝路881号");
        let t = target("t1", "上海为民食品厂", "北京市朝阳区建国路99号");
        let score = pipeline.score_pair(&s, &t, &name_heavy);
        assert!(score.final_score <= 0.93, "score = {}", score.final_score);
        assert!(score
            .explanation
            .iter()
            .any(|e| e.contains("address disagreement")));
    }

    #[test]
    fn test_missing_fields_are_excluded_not_zeroed() {
        let pipeline = ScoringPipeline::new(MatchConfig::default());
        let s = source("上海为民食品厂", "");
        let t = target("t1", "上海为民食品厂", "上海市虹口区天宝路881号");
        let score = pipeline.score_pair(&s, &t, &mappings());
        // Only the name carries signal; its score stands alone.
        assert_eq!(score.per_field_scores.len(), 1);
        assert!(score.final_score > 0.9, "score = {}", score.final_score);
    }

    #[test]
    fn test_no_signal_rejects() {
        let pipeline = ScoringPipeline::new(MatchConfig::default());
        let s = Record::new("inspection", "s1");
        let t = target("t1", "上海为民食品厂", "");
        let score = pipeline.score_pair(&s, &t, &mappings());
        assert_eq!(score.match_type, MatchType::None);
        assert_eq!(score.final_score, 0.0);
    }

    #[test]
    fn test_hierarchical_gate_rejects_weak_primary() {
        let pipeline = ScoringPipeline::new(MatchConfig::default());
        let gated = vec![
            FieldMapping::new("unit_name", "company_name", 0.6, MatchFieldType::Name)
                .primary(0.8),
            FieldMapping::new("address", "reg_address", 0.4, MatchFieldType::Address)
                .primary(0.8),
        ];
        let s = source("上海为民食品厂", "上海市虹口区天宝路881号");
        let t = target("t1", "上海为民食品厂", "广州市天河区体育西路3号");
        let score = pipeline.score_pair(&s, &t, &gated);
        assert_eq!(score.match_type, MatchType::None);
        assert!(score.explanation[0].contains("primary field"));
    }

    #[test]
    fn test_graph_escalation_promotes_mid_band() {
        let graph = Arc::new(GraphIndex::new());
        let extended = vec![
            FieldMapping::new("unit_name", "company_name", 0.6, MatchFieldType::Name),
            FieldMapping::new("address", "reg_address", 0.25, MatchFieldType::Address),
            FieldMapping::new("legal_person", "legal_rep", 0.15, MatchFieldType::Text),
        ];
        // Different trades keep the blend in the mid band; the shared rare
        // address and legal person push it up.
        let s = source("上海为民食品厂", "上海市虹口区天宝路881号")
            .with_text("legal_person", "张伟");
        let t = target("t1", "上海为民贸易厂", "虹口区天宝路881号")
            .with_text("legal_rep", "张伟");
        graph.build(std::slice::from_ref(&s), &extended, true);
        graph.build(std::slice::from_ref(&t), &extended, false);

        let bare = ScoringPipeline::new(MatchConfig::default());
        let baseline = bare.score_pair(&s, &t, &extended);
        assert!(
            baseline.final_score >= 0.70 && baseline.final_score < 0.99,
            "baseline = {}",
            baseline.final_score
        );

        let pipeline = ScoringPipeline::new(MatchConfig::default()).with_graph(Arc::clone(&graph));
        let escalated = pipeline.score_pair(&s, &t, &extended);
        assert!(escalated.final_score > baseline.final_score);
        assert_eq!(escalated.match_type, MatchType::GraphCorroborated);
        assert!(escalated.structurally_corroborated);
    }

    #[test]
    fn test_deterministic_scoring() {
        let pipeline = ScoringPipeline::new(MatchConfig::default());
        let s = source("上海为民食品厂", "上海市虹口区天宝路881号");
        let t = target("t1", "上海惠民食品厂", "天宝路828号");
        let first = pipeline.score_pair(&s, &t, &mappings());
        let second = pipeline.score_pair(&s, &t, &mappings());
        assert_eq!(first.final_score, second.final_score);
        assert_eq!(first.explanation, second.explanation);
    }
}
