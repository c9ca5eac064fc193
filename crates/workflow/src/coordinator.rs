//! The workflow coordinator.
//!
//! Runs stages in order, each already wrapped in its own retry/validate
//! loop. Stage status is reported to the progress sink after every
//! transition. A stage that exhausts its retry budget either degrades the
//! run (recoverable: continue with the fallback value) or aborts it
//! (non-recoverable: overall error, subsequent stages stay pending).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deskhand_agent::engine::RetryOutcome;
use deskhand_core::interfaces::{ProgressSink, StageStatus};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// One unit of work in a workflow.
///
/// `run` executes the stage's own produce → validate → correct loop and
/// returns the accepted or fallback value; the coordinator never sees
/// individual attempts.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stable key used for progress reporting and the per-run output cache.
    fn key(&self) -> &str;

    /// Whether the run may continue with this stage's fallback output after
    /// its retry budget is exhausted.
    fn recoverable(&self) -> bool {
        true
    }

    async fn run(&self, input: &Value) -> RetryOutcome<Value>;
}

/// Book-keeping for one stage within a run.
#[derive(Debug, Clone)]
pub struct StageRecord {
    pub key: String,
    pub status: StageStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// The state of one workflow run. Terminal once every stage completed or
/// one stage errored.
#[derive(Debug, Clone)]
pub struct WorkflowRun {
    pub run_id: String,
    pub stages: Vec<StageRecord>,
    /// The last completed stage's output, when the run did not abort.
    pub artifact: Option<Value>,
    /// Set when a non-recoverable stage exhausted its attempts.
    pub failed: bool,
}

impl WorkflowRun {
    fn new(run_id: &str, stage_keys: impl Iterator<Item = String>) -> Self {
        Self {
            run_id: run_id.to_string(),
            stages: stage_keys
                .map(|key| StageRecord {
                    key,
                    status: StageStatus::Pending,
                    started_at: None,
                    finished_at: None,
                })
                .collect(),
            artifact: None,
            failed: false,
        }
    }

    /// Status of a stage by key.
    pub fn status_of(&self, key: &str) -> Option<StageStatus> {
        self.stages.iter().find(|s| s.key == key).map(|s| s.status)
    }
}

/// Executes stages in order with progress reporting and per-run caching.
pub struct WorkflowCoordinator {
    stages: Vec<Arc<dyn Stage>>,
    progress: Arc<dyn ProgressSink>,
    /// Completed-stage outputs keyed by (run id, stage key). Lives for this
    /// coordinator's lifetime only.
    cache: RwLock<HashMap<(String, String), Value>>,
}

impl WorkflowCoordinator {
    pub fn new(progress: Arc<dyn ProgressSink>) -> Self {
        Self {
            stages: Vec::new(),
            progress,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Append a stage. Order of addition is execution order.
    pub fn add_stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Execute (or resume) the run with the given id.
    ///
    /// Re-invoking with the same run id after a partial failure skips every
    /// stage whose output is already cached and restarts from the one that
    /// failed.
    pub async fn execute(&self, run_id: &str, initial: Value) -> WorkflowRun {
        let mut run = WorkflowRun::new(run_id, self.stages.iter().map(|s| s.key().to_string()));

        for stage in &self.stages {
            self.progress.update(stage.key(), StageStatus::Pending).await;
        }

        info!(run_id, stages = self.stages.len(), "Workflow run started");

        let mut current = initial;
        for (idx, stage) in self.stages.iter().enumerate() {
            let key = stage.key().to_string();
            let cache_key = (run_id.to_string(), key.clone());

            if let Some(cached) = self.cache.read().await.get(&cache_key).cloned() {
                info!(run_id, stage = %key, "Stage output cached, skipping");
                run.stages[idx].status = StageStatus::Completed;
                self.progress.update(&key, StageStatus::Completed).await;
                current = cached;
                continue;
            }

            run.stages[idx].status = StageStatus::InProgress;
            run.stages[idx].started_at = Some(Utc::now());
            self.progress.update(&key, StageStatus::InProgress).await;

            let outcome = stage.run(&current).await;
            run.stages[idx].finished_at = Some(Utc::now());

            if !outcome.succeeded && !stage.recoverable() {
                warn!(
                    run_id,
                    stage = %key,
                    attempts = outcome.attempts_used,
                    feedback = %outcome.last_validator_feedback,
                    "Non-recoverable stage exhausted its attempts, aborting run"
                );
                run.stages[idx].status = StageStatus::Error;
                self.progress.update(&key, StageStatus::Error).await;
                run.failed = true;
                return run;
            }

            if !outcome.succeeded {
                warn!(
                    run_id,
                    stage = %key,
                    attempts = outcome.attempts_used,
                    "Stage degraded to fallback output, continuing"
                );
            }

            self.cache
                .write()
                .await
                .insert(cache_key, outcome.value.clone());
            run.stages[idx].status = StageStatus::Completed;
            self.progress.update(&key, StageStatus::Completed).await;
            current = outcome.value;
        }

        info!(run_id, "Workflow run completed");
        run.artifact = Some(current);
        run
    }
}
