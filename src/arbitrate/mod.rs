// src/arbitrate/mod.rs - Deterministic selection among scored candidates
//
// Thresholds scale with how many fields actually carried signal: a score
// built from one field must clear a higher bar than one corroborated by
// three. Near-ties within the margin are settled by structural evidence,
// never by float noise.
use std::cmp::Ordering;

use log::debug;

use crate::models::mapping::MatchConfig;
use crate::models::matching::{MatchScore, MatchType};

/// Qualification threshold for a score, by its signal-field count.
pub fn threshold_for(score: &MatchScore, cfg: &MatchConfig) -> f64 {
    match score.per_field_scores.len() {
        0 | 1 => cfg.threshold_one_field,
        2 => cfg.threshold_two_fields,
        _ => cfg.threshold_many_fields,
    }
}

/// Picks the winning candidate, or `None` when nothing qualifies. The
/// input order never influences the outcome.
pub fn select(scores: &[MatchScore], cfg: &MatchConfig) -> Option<MatchScore> {
    let mut qualified: Vec<&MatchScore> = scores
        .iter()
        .filter(|s| s.match_type != MatchType::None)
        .filter(|s| s.final_score >= threshold_for(s, cfg))
        .collect();
    if qualified.is_empty() {
        return None;
    }

    qualified.sort_by(|a, b| {
        compare_scores(b.final_score, a.final_score)
            .then_with(|| a.candidate_id.cmp(&b.candidate_id))
    });
    let top = qualified[0].final_score;

    let mut contenders: Vec<&MatchScore> = qualified
        .into_iter()
        .take_while(|s| top - s.final_score <= cfg.arbitration_margin)
        .collect();
    if contenders.len() > 1 {
        debug!(
            "arbitration margin holds {} contenders at top score {:.3}",
            contenders.len(),
            top
        );
        contenders.sort_by(|a, b| tie_break(a, b));
    }
    Some(contenders[0].clone())
}

/// Tie-break order inside the margin: structural corroboration, then record
/// completeness, then address and legal-person agreement, then the smallest
/// candidate id so that repeated runs agree.
fn tie_break(a: &MatchScore, b: &MatchScore) -> Ordering {
    b.structurally_corroborated
        .cmp(&a.structurally_corroborated)
        .then_with(|| compare_scores(b.target_completeness, a.target_completeness))
        .then_with(|| compare_optional(b.address_agreement, a.address_agreement))
        .then_with(|| compare_optional(b.legal_person_agreement, a.legal_person_agreement))
        .then_with(|| a.candidate_id.cmp(&b.candidate_id))
}

fn compare_scores(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

fn compare_optional(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => compare_scores(x, y),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}
