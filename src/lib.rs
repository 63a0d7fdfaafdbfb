// src/lib.rs - Registry reconciliation engine
//
// Matches organization records between a fire-safety inspection registry
// and a supervision registry whose schemas and spellings disagree. The
// core is storage-agnostic and side-effect free; hosts wire a store,
// declare field mappings and drive tasks through `MatchEngine`.

pub mod arbitrate;
pub mod candidates;
pub mod error;
pub mod graph;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod pipeline;
pub mod similarity;
pub mod storage;

pub use error::{MatchError, StoreError};
pub use models::mapping::{validate_mappings, FieldMapping, MatchConfig, MatchFieldType};
pub use models::matching::{
    CandidateSet, ConfidenceLevel, MatchResult, MatchScore, MatchType, ReviewStatus,
};
pub use models::progress::{TaskMode, TaskProgress, TaskStatus};
pub use models::record::{FieldValue, Record, RecordId};
pub use orchestrator::MatchEngine;
pub use pipeline::ScoringPipeline;
pub use storage::memory::MemoryStore;
pub use storage::postgres::PostgresStore;
pub use storage::{FindFilter, RecordStore, UpsertOutcome};
