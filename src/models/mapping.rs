// src/models/mapping.rs - Cross-schema field mapping and engine configuration
use serde::{Deserialize, Serialize};

use crate::error::MatchError;

/// How a mapped field pair is compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchFieldType {
    /// Unique identifier (e.g. the 18-character unified social credit code).
    /// Normalized equality short-circuits the whole pipeline.
    ExactKey,
    /// Organization name, scored through structured decomposition.
    Name,
    /// Generic string field (legal person, registration authority, ...).
    Text,
    Address,
    Phone,
    Numeric,
}

/// Declares one cross-schema correspondence and its scoring weight.
/// Supplied once per task; the only configuration surface of the core
/// contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMapping {
    pub source_field: String,
    pub target_field: String,
    pub weight: f64,
    pub is_primary: bool,
    pub match_type: MatchFieldType,
    /// Per-field floor used by the hierarchical gate for primary fields.
    pub threshold: f64,
}

impl FieldMapping {
    pub fn new(
        source_field: impl Into<String>,
        target_field: impl Into<String>,
        weight: f64,
        match_type: MatchFieldType,
    ) -> Self {
        FieldMapping {
            source_field: source_field.into(),
            target_field: target_field.into(),
            weight,
            is_primary: false,
            match_type,
            threshold: 0.0,
        }
    }

    pub fn primary(mut self, threshold: f64) -> Self {
        self.is_primary = true;
        self.threshold = threshold;
        self
    }
}

/// Validates a mapping set before any processing starts. Invalid mappings
/// fail the task fast rather than surfacing mid-batch.
pub fn validate_mappings(mappings: &[FieldMapping]) -> Result<(), MatchError> {
    if mappings.is_empty() {
        return Err(MatchError::Config("field mapping list is empty".into()));
    }
    let mut weight_sum = 0.0;
    for m in mappings {
        if m.source_field.trim().is_empty() || m.target_field.trim().is_empty() {
            return Err(MatchError::Config(format!(
                "mapping {:?} -> {:?} has a blank field name",
                m.source_field, m.target_field
            )));
        }
        if !(m.weight.is_finite()) || m.weight < 0.0 {
            return Err(MatchError::Config(format!(
                "mapping {} -> {} has invalid weight {}",
                m.source_field, m.target_field, m.weight
            )));
        }
        if !(0.0..=1.0).contains(&m.threshold) {
            return Err(MatchError::Config(format!(
                "mapping {} -> {} has threshold {} outside [0,1]",
                m.source_field, m.target_field, m.threshold
            )));
        }
        weight_sum += m.weight;
    }
    if weight_sum <= 0.0 {
        return Err(MatchError::Config(
            "field mapping weights sum to zero".into(),
        ));
    }
    Ok(())
}

/// Numeric knobs of the engine. Hosts override these in code; there is no
/// configuration-file surface in the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Source registry collection name.
    pub source_collection: String,
    /// Target registry collection name.
    pub target_collection: String,
    /// Persisted match result collection name.
    pub results_collection: String,

    /// Upper bound on candidates returned per source record.
    pub max_candidates: usize,
    /// Bounded worker pool size inside one batch.
    pub worker_pool_size: usize,

    /// Core-name weight inside the structured name score.
    pub core_name_weight: f64,
    /// Core similarity at or above this earns the bounded boost.
    pub core_boost_floor: f64,
    /// Multiplicative boost applied at `core_boost_floor`.
    pub core_boost_factor: f64,
    /// Core similarity below this applies the strictness penalty.
    pub core_strict_floor: f64,
    /// Penalty factor under the strictness floor.
    pub core_strict_penalty: f64,
    /// Maximum attainable score under the strictness floor.
    pub core_strict_cap: f64,
    /// Address similarity under this floor caps a high name score...
    pub address_conflict_floor: f64,
    /// ...at this ceiling.
    pub address_conflict_cap: f64,

    /// Fuzzy scores never reach 1.0; only ExactKey does.
    pub fuzzy_ceiling: f64,

    /// Graph escalation band and boost.
    pub graph_band_low: f64,
    pub graph_band_high: f64,
    pub graph_min_corroboration: f64,
    pub graph_max_boost: f64,

    /// Arbitration thresholds by the number of signal-bearing fields.
    pub threshold_one_field: f64,
    pub threshold_two_fields: f64,
    pub threshold_many_fields: f64,
    /// Candidates within this margin of the top score go to tie-breaks.
    pub arbitration_margin: f64,

    /// Bounded pipeline cache capacity (name decompositions).
    pub cache_capacity: usize,

    /// Relative tolerance band for numeric fields.
    pub numeric_tolerance: f64,

    /// Enable the CJK phonetic channel in string similarity.
    pub phonetic_channel: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        MatchConfig {
            source_collection: "inspection_units".to_string(),
            target_collection: "supervision_units".to_string(),
            results_collection: "match_results".to_string(),
            max_candidates: 50,
            worker_pool_size: 8,
            core_name_weight: 0.65,
            core_boost_floor: 0.9,
            core_boost_factor: 1.05,
            core_strict_floor: 0.6,
            core_strict_penalty: 0.85,
            core_strict_cap: 0.75,
            address_conflict_floor: 0.4,
            address_conflict_cap: 0.93,
            fuzzy_ceiling: 0.99,
            graph_band_low: 0.70,
            graph_band_high: 0.99,
            graph_min_corroboration: 0.5,
            graph_max_boost: 0.08,
            threshold_one_field: 0.90,
            threshold_two_fields: 0.82,
            threshold_many_fields: 0.75,
            arbitration_margin: 0.05,
            cache_capacity: 4096,
            numeric_tolerance: 0.1,
            phonetic_channel: true,
        }
    }
}

impl MatchConfig {
    pub fn validate(&self) -> Result<(), MatchError> {
        if self.max_candidates == 0 {
            return Err(MatchError::Config("max_candidates must be > 0".into()));
        }
        if self.worker_pool_size == 0 {
            return Err(MatchError::Config("worker_pool_size must be > 0".into()));
        }
        if self.graph_band_low >= self.graph_band_high {
            return Err(MatchError::Config(
                "graph escalation band is inverted".into(),
            ));
        }
        Ok(())
    }
}
