//! Multi-stage validated workflows.
//!
//! A workflow is an ordered list of named stages, each independently wrapped
//! in its own bounded retry/validate loop. The coordinator reports stage
//! transitions to an injected progress sink, feeds each stage's accepted (or
//! fallback) output into the next stage, and caches completed-stage outputs
//! per run id so a re-invocation after a partial failure resumes from the
//! failed stage instead of redoing finished work.

pub mod coordinator;
pub mod digest;
pub mod progress;

pub use coordinator::{Stage, StageRecord, WorkflowCoordinator, WorkflowRun};
pub use digest::{
    digest_pipeline, CollectStage, DigestSettings, PublishStage, QueryStage, SummarizeStage,
};
pub use progress::TransportProgress;
