// src/pipeline/stages.rs - The fixed stage order of the scoring pipeline

/// Stages run in this order for every (source, candidate) pair. Only the
/// exact-identifier stage and outright rejections short-circuit; everything
/// else refines the running score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    /// Normalized unique-identifier equality; the only source of 1.0.
    ExactKey,
    /// Structured name decomposition and component-weighted comparison.
    StructuredName,
    /// Weighted blend across all mapped fields.
    FieldBlend,
    /// Bounded boosts and penalties from core-name and address agreement.
    Enhancement,
    /// Per-field floors for primary fields when several are configured.
    HierarchicalGate,
    /// Shared-attribute corroboration for mid-band fuzzy scores.
    GraphEscalation,
}

pub fn default_stages() -> Vec<StageKind> {
    vec![
        StageKind::ExactKey,
        StageKind::StructuredName,
        StageKind::FieldBlend,
        StageKind::Enhancement,
        StageKind::HierarchicalGate,
        StageKind::GraphEscalation,
    ]
}
