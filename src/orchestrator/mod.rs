// src/orchestrator/mod.rs - Resumable batch matching over the storage contract
//
// One asynchronous worker owns a task end to end: it snapshots the target
// registry, builds the candidate and corroboration indexes, then walks the
// source registry in id order, one batch at a time. Records inside a batch
// are scored concurrently on a bounded pool; results are persisted per
// batch, and progress advances only after the whole batch is flushed, so a
// crash costs at most one batch of rework.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use futures::future::join_all;
use log::{error, info, warn};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::arbitrate;
use crate::candidates::CandidateIndex;
use crate::error::MatchError;
use crate::graph::{attribute_fields, GraphIndex};
use crate::models::mapping::{validate_mappings, FieldMapping, MatchConfig};
use crate::models::matching::MatchResult;
use crate::models::progress::{TaskMode, TaskProgress, TaskStatus};
use crate::models::record::{Record, RecordId};
use crate::pipeline::ScoringPipeline;
use crate::storage::{FindFilter, RecordStore};

const TARGET_SNAPSHOT_PAGE: usize = 1000;
const FLUSH_ATTEMPTS: usize = 3;
const FLUSH_BACKOFF_MS: u64 = 100;

struct TaskHandle {
    progress: Arc<Mutex<TaskProgress>>,
    cancel: CancellationToken,
    join: Option<JoinHandle<()>>,
}

/// Entry point of the engine: starts tasks, reports progress, answers
/// result lookups. One engine may run several tasks, though collections
/// are typically disjoint per task.
pub struct MatchEngine {
    store: Arc<dyn RecordStore>,
    config: MatchConfig,
    tasks: tokio::sync::Mutex<HashMap<Uuid, TaskHandle>>,
}

impl MatchEngine {
    pub fn new(store: Arc<dyn RecordStore>, config: MatchConfig) -> Result<MatchEngine, MatchError> {
        config.validate()?;
        Ok(MatchEngine {
            store,
            config,
            tasks: tokio::sync::Mutex::new(HashMap::new()),
        })
    }

    /// Validates the mapping set and spawns the matching worker. Returns
    /// the task id immediately; progress is polled separately.
    pub async fn start_task(
        &self,
        mode: TaskMode,
        batch_size: usize,
        mappings: Vec<FieldMapping>,
    ) -> Result<Uuid, MatchError> {
        validate_mappings(&mappings)?;
        if batch_size == 0 {
            return Err(MatchError::Config("batch_size must be > 0".into()));
        }

        let task_id = Uuid::new_v4();
        let mut progress = TaskProgress::new(task_id, mode);
        progress.status = TaskStatus::Running;
        let progress = Arc::new(Mutex::new(progress));
        let cancel = CancellationToken::new();

        info!(
            "🚀 task {} starting in {} mode (batch size {})",
            task_id,
            mode.as_str(),
            batch_size
        );

        let worker = TaskWorker {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            mappings: Arc::new(mappings),
            mode,
            batch_size,
            progress: Arc::clone(&progress),
            cancel: cancel.clone(),
        };
        let join = tokio::spawn(async move { worker.run().await });

        let mut tasks = self.tasks.lock().await;
        tasks.insert(
            task_id,
            TaskHandle {
                progress,
                cancel,
                join: Some(join),
            },
        );
        Ok(task_id)
    }

    /// Snapshot of a task's progress, or `None` for an unknown id.
    pub async fn progress(&self, task_id: Uuid) -> Option<TaskProgress> {
        let tasks = self.tasks.lock().await;
        tasks
            .get(&task_id)
            .map(|h| snapshot(&h.progress))
    }

    /// Requests a stop. The worker finishes and flushes its current batch
    /// before transitioning to Stopped. Returns false for unknown tasks.
    pub async fn stop_task(&self, task_id: Uuid) -> bool {
        let tasks = self.tasks.lock().await;
        match tasks.get(&task_id) {
            Some(handle) => {
                info!("⏹️ stop requested for task {}", task_id);
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Waits for a task's worker to finish and returns the final progress.
    pub async fn wait(&self, task_id: Uuid) -> Option<TaskProgress> {
        let join = {
            let mut tasks = self.tasks.lock().await;
            tasks.get_mut(&task_id).and_then(|h| h.join.take())
        };
        if let Some(join) = join {
            if let Err(e) = join.await {
                error!("task {} worker panicked: {}", task_id, e);
            }
        }
        self.progress(task_id).await
    }

    /// Stored result for one source record, if any.
    pub async fn match_result(
        &self,
        source_id: &RecordId,
    ) -> Result<Option<MatchResult>, MatchError> {
        let docs = self
            .store
            .find(
                &self.config.results_collection,
                &FindFilter::ids(vec![source_id.0.clone()]),
                Some(1),
                0,
            )
            .await?;
        Ok(docs.first().and_then(MatchResult::from_document))
    }
}

fn snapshot(progress: &Arc<Mutex<TaskProgress>>) -> TaskProgress {
    match progress.lock() {
        Ok(p) => p.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

fn update<F: FnOnce(&mut TaskProgress)>(progress: &Arc<Mutex<TaskProgress>>, f: F) {
    let mut guard = match progress.lock() {
        Ok(p) => p,
        Err(poisoned) => poisoned.into_inner(),
    };
    f(&mut guard);
}

struct TaskWorker {
    store: Arc<dyn RecordStore>,
    config: MatchConfig,
    mappings: Arc<Vec<FieldMapping>>,
    mode: TaskMode,
    batch_size: usize,
    progress: Arc<Mutex<TaskProgress>>,
    cancel: CancellationToken,
}

impl TaskWorker {
    async fn run(self) {
        let task_id = snapshot(&self.progress).task_id;
        match self.run_inner().await {
            Ok(final_status) => {
                update(&self.progress, |p| {
                    p.status = final_status;
                    p.finished_at = Some(Utc::now());
                });
                let p = snapshot(&self.progress);
                info!(
                    "✅ task {} {:?}: {}/{} processed, {} matched, {} skipped, {} errors in {:.1}s",
                    task_id,
                    p.status,
                    p.processed_records,
                    p.total_records,
                    p.matched_records,
                    p.skipped_records,
                    p.error_records,
                    p.elapsed_seconds()
                );
            }
            Err(e) => {
                error!("❌ task {} failed: {:#}", task_id, e);
                update(&self.progress, |p| {
                    p.status = TaskStatus::Error;
                    p.last_error = Some(format!("{:#}", e));
                    p.finished_at = Some(Utc::now());
                });
            }
        }
    }

    async fn run_inner(&self) -> anyhow::Result<TaskStatus> {
        if self.mode == TaskMode::Full {
            info!("🧹 full mode: clearing {}", self.config.results_collection);
            self.store
                .clear(&self.config.results_collection)
                .await
                .context("clearing results collection")?;
        }

        let total = self
            .store
            .count(&self.config.source_collection, &FindFilter::all())
            .await
            .context("counting source records")?;
        update(&self.progress, |p| p.total_records = total);

        let targets = self.load_target_snapshot().await?;
        info!(
            "📦 target snapshot: {} records from {}",
            targets.len(),
            self.config.target_collection
        );

        let graph = Arc::new(GraphIndex::new());
        graph.build(&targets, &self.mappings, false);
        let source_attr_fields = Arc::new(attribute_fields(&self.mappings, true));

        let index = Arc::new(CandidateIndex::build(
            &self.config.target_collection,
            targets,
            &self.mappings,
            self.config.max_candidates,
        ));
        let pipeline = Arc::new(
            ScoringPipeline::new(self.config.clone()).with_graph(Arc::clone(&graph)),
        );
        let semaphore = Arc::new(Semaphore::new(self.config.worker_pool_size));

        let mut last_id: Option<RecordId> = None;
        loop {
            if self.cancel.is_cancelled() {
                info!("⏹️ task stopping after last committed batch");
                return Ok(TaskStatus::Stopped);
            }

            let docs = self
                .store
                .find(
                    &self.config.source_collection,
                    &FindFilter::after(last_id.as_ref().map(|id| id.as_str())),
                    Some(self.batch_size),
                    0,
                )
                .await
                .context("fetching source batch")?;
            if docs.is_empty() {
                return Ok(TaskStatus::Completed);
            }

            let mut batch: Vec<Record> = Vec::with_capacity(docs.len());
            let mut parse_failures = 0usize;
            // Paging advances by document id even past malformed documents,
            // otherwise a bad row would be refetched forever.
            let mut batch_last_id: Option<RecordId> = None;
            for doc in &docs {
                if let Some(id) = doc.get("_id").and_then(|v| v.as_str()) {
                    batch_last_id = Some(RecordId::new(id));
                }
                match Record::from_document(&self.config.source_collection, doc) {
                    Some(r) => batch.push(r),
                    None => {
                        warn!("skipping malformed source document: {}", doc);
                        parse_failures += 1;
                    }
                }
            }

            let existing = self.load_existing_results(&batch).await?;
            let (pending, skipped, scored) = self
                .score_batch(batch, &existing, &index, &pipeline, &graph, &source_attr_fields, &semaphore)
                .await;

            self.flush(&pending).await?;

            let matched = scored
                .iter()
                .filter(|r| r.matched_record_id.is_some())
                .count();
            update(&self.progress, |p| {
                // Parse failures count as processed so a completed task
                // reaches its total even with malformed source documents.
                p.processed_records += scored.len() + skipped + parse_failures;
                p.matched_records += matched;
                p.skipped_records += skipped;
                p.error_records += parse_failures;
                p.batches_committed += 1;
                if batch_last_id.is_some() {
                    p.last_processed_id = batch_last_id.clone();
                }
            });
            if let Some(id) = batch_last_id {
                last_id = Some(id);
            } else {
                // No document in the page carried an id; paging cannot
                // advance past it.
                anyhow::bail!("source batch contained no addressable documents");
            }
        }
    }

    async fn load_target_snapshot(&self) -> anyhow::Result<Vec<Record>> {
        let mut targets = Vec::new();
        let mut last: Option<String> = None;
        loop {
            let docs = self
                .store
                .find(
                    &self.config.target_collection,
                    &FindFilter::after(last.as_deref()),
                    Some(TARGET_SNAPSHOT_PAGE),
                    0,
                )
                .await
                .context("loading target snapshot")?;
            if docs.is_empty() {
                return Ok(targets);
            }
            for doc in &docs {
                if let Some(r) = Record::from_document(&self.config.target_collection, doc) {
                    last = Some(r.id.0.clone());
                    targets.push(r);
                } else {
                    warn!("skipping malformed target document: {}", doc);
                }
            }
        }
    }

    /// Stored results for the batch's ids, for skip and change detection.
    async fn load_existing_results(
        &self,
        batch: &[Record],
    ) -> anyhow::Result<HashMap<String, MatchResult>> {
        if self.mode == TaskMode::Full || batch.is_empty() {
            return Ok(HashMap::new());
        }
        let ids: Vec<String> = batch.iter().map(|r| r.id.0.clone()).collect();
        let docs = self
            .store
            .find(
                &self.config.results_collection,
                &FindFilter::ids(ids),
                None,
                0,
            )
            .await
            .context("loading existing results")?;
        let mut existing = HashMap::new();
        for doc in &docs {
            if let Some(result) = MatchResult::from_document(doc) {
                existing.insert(result.primary_record_id.0.clone(), result);
            }
        }
        Ok(existing)
    }

    /// Scores a batch concurrently. Returns the results to persist, the
    /// count of skipped records and every freshly computed result.
    #[allow(clippy::too_many_arguments)]
    async fn score_batch(
        &self,
        batch: Vec<Record>,
        existing: &HashMap<String, MatchResult>,
        index: &Arc<CandidateIndex>,
        pipeline: &Arc<ScoringPipeline>,
        graph: &Arc<GraphIndex>,
        source_attr_fields: &Arc<Vec<(String, crate::graph::AttributeKind)>>,
        semaphore: &Arc<Semaphore>,
    ) -> (Vec<MatchResult>, usize, Vec<MatchResult>) {
        let mut skipped = 0usize;
        let mut handles = Vec::new();
        for record in batch {
            if self.mode == TaskMode::Incremental {
                if let Some(prior) = existing.get(record.id.as_str()) {
                    if prior.matched_record_id.is_some() {
                        skipped += 1;
                        continue;
                    }
                }
            }

            let store = Arc::clone(&self.store);
            let index = Arc::clone(index);
            let pipeline = Arc::clone(pipeline);
            let graph = Arc::clone(graph);
            let attr_fields = Arc::clone(source_attr_fields);
            let mappings = Arc::clone(&self.mappings);
            let config = self.config.clone();
            let semaphore = Arc::clone(semaphore);
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                graph.add_unit(&record, &attr_fields);
                let set = index.candidates(&record, &mappings, store.as_ref()).await;
                if set.is_empty() {
                    let mut reasons = vec!["no candidates found".to_string()];
                    if set.degraded {
                        reasons.push("candidate lookup tiers degraded".to_string());
                    }
                    return MatchResult::unmatched(record.id, reasons);
                }
                let scores: Vec<_> = set
                    .candidates
                    .iter()
                    .map(|c| pipeline.score_pair(&record, c, &mappings))
                    .collect();
                match arbitrate::select(&scores, &config) {
                    Some(winner) => MatchResult::from_score(record.id, &winner),
                    None => MatchResult::unmatched(
                        record.id,
                        vec![format!(
                            "no candidate of {} qualified",
                            scores.len()
                        )],
                    ),
                }
            }));
        }

        let mut scored = Vec::new();
        for outcome in join_all(handles).await {
            match outcome {
                Ok(result) => scored.push(result),
                Err(e) => {
                    error!("scoring worker failed: {}", e);
                    update(&self.progress, |p| p.error_records += 1);
                }
            }
        }
        scored.sort_by(|a, b| a.primary_record_id.cmp(&b.primary_record_id));

        // Unchanged outcomes are not rewritten; changed ones keep their
        // original creation time.
        let mut pending = Vec::new();
        for mut result in scored.clone() {
            match existing.get(result.primary_record_id.as_str()) {
                Some(prior) if prior.same_outcome(&result) => {}
                Some(prior) => {
                    result.created_at = prior.created_at;
                    pending.push(result);
                }
                None => pending.push(result),
            }
        }
        (pending, skipped, scored)
    }

    /// Persists one batch with bounded retries. A batch either lands fully
    /// or the task stops at the previous committed boundary.
    async fn flush(&self, pending: &[MatchResult]) -> anyhow::Result<()> {
        for result in pending {
            let key = result.primary_record_id.as_str();
            let doc = result.to_document();
            let mut attempt = 0;
            loop {
                match self
                    .store
                    .upsert(&self.config.results_collection, key, doc.clone())
                    .await
                {
                    Ok(_) => break,
                    Err(e) if attempt + 1 < FLUSH_ATTEMPTS => {
                        let backoff = FLUSH_BACKOFF_MS * (1 << attempt);
                        warn!(
                            "upsert of {} failed (attempt {}): {}; retrying in {}ms",
                            key,
                            attempt + 1,
                            e,
                            backoff
                        );
                        tokio::time::sleep(Duration::from_millis(backoff)).await;
                        attempt += 1;
                    }
                    Err(e) => {
                        anyhow::bail!(
                            "upsert of {} failed after {} attempts: {}",
                            key,
                            FLUSH_ATTEMPTS,
                            e
                        );
                    }
                }
            }
        }
        Ok(())
    }
}
