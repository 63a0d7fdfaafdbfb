// src/models/progress.rs - Task progress snapshots
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::record::RecordId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskMode {
    /// Skip records whose stored result already references a matched
    /// candidate; re-evaluate previously unmatched records.
    Incremental,
    /// Re-evaluate and upsert every source record.
    Update,
    /// Clear all stored results first, then behave as Update.
    Full,
}

impl TaskMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskMode::Incremental => "incremental",
            TaskMode::Update => "update",
            TaskMode::Full => "full",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Idle,
    Running,
    Completed,
    Stopped,
    Error,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Stopped | TaskStatus::Error
        )
    }
}

/// Snapshot of a running or finished task. Mutated only by the owning
/// orchestration worker; read concurrently through the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskProgress {
    pub task_id: Uuid,
    pub mode: TaskMode,
    pub status: TaskStatus,
    pub total_records: usize,
    pub processed_records: usize,
    pub matched_records: usize,
    pub skipped_records: usize,
    pub error_records: usize,
    pub batches_committed: usize,
    /// Resumption boundary: the last record id of the last committed batch.
    pub last_processed_id: Option<RecordId>,
    pub last_error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskProgress {
    pub fn new(task_id: Uuid, mode: TaskMode) -> TaskProgress {
        TaskProgress {
            task_id,
            mode,
            status: TaskStatus::Idle,
            total_records: 0,
            processed_records: 0,
            matched_records: 0,
            skipped_records: 0,
            error_records: 0,
            batches_committed: 0,
            last_processed_id: None,
            last_error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn elapsed_seconds(&self) -> f64 {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    /// Rough completion estimate from the committed rate so far.
    pub fn eta_seconds(&self) -> Option<f64> {
        if self.processed_records == 0 || self.status != TaskStatus::Running {
            return None;
        }
        let elapsed = self.elapsed_seconds();
        if elapsed <= 0.0 {
            return None;
        }
        let rate = self.processed_records as f64 / elapsed;
        let remaining = self.total_records.saturating_sub(self.processed_records);
        Some(remaining as f64 / rate.max(f64::EPSILON))
    }
}
