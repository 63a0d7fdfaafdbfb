// src/error.rs - Error taxonomy of the matching core
use thiserror::Error;

/// Categories the orchestrator branches on. Per-pair failures never abort a
/// batch; they degrade to score 0 with the reason in the explanation trail.
#[derive(Debug, Error)]
pub enum MatchError {
    /// Malformed or missing data on one record. The pair scores 0 and
    /// processing continues.
    #[error("input error: {0}")]
    Input(String),

    /// A lookup backend is down or unsupported. The candidate index falls
    /// back to a cheaper strategy.
    #[error("index unavailable: {0}")]
    IndexUnavailable(String),

    /// Batch upsert failure after retries. The task transitions to Error
    /// with the last committed boundary recorded.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Invalid or missing field mappings. Fails fast before any processing.
    #[error("config error: {0}")]
    Config(String),
}

/// Storage-contract errors, mapped into `MatchError` categories at the
/// call sites that know which degradation applies.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("collection {0} not found")]
    CollectionNotFound(String),

    #[error("text search unsupported by this store")]
    TextSearchUnsupported,

    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl From<StoreError> for MatchError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::TextSearchUnsupported => MatchError::IndexUnavailable(e.to_string()),
            other => MatchError::Persistence(other.to_string()),
        }
    }
}
