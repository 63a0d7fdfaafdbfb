// src/models/mod.rs

pub mod mapping;
pub mod matching;
pub mod progress;
pub mod record;

pub use mapping::{FieldMapping, MatchConfig, MatchFieldType};
pub use matching::{
    CandidateSet, ConfidenceLevel, MatchResult, MatchScore, MatchType, ReviewStatus,
};
pub use progress::{TaskMode, TaskProgress, TaskStatus};
pub use record::{FieldValue, Record, RecordId};
