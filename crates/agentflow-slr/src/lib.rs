//! agentflow-slr — Systematic literature review batch classification.
//!
//! A batch run deduplicates an uploaded record set, then pushes every
//! surviving record through five agent stages (`screen`, `path`, `cg`, `esg`,
//! `meta`) on a bounded worker pool. Screening gates the later stages,
//! stage output is parsed tolerantly, and per-record failures stay in that
//! record's result slot. Progress is published as [`events::JobEvent`]s and
//! accumulated in a [`job::JobStore`].

pub mod classifier;
pub mod events;
pub mod extract;
pub mod feedback;
pub mod job;
pub mod result;
pub mod scheduler;
pub mod stage;

pub use classifier::ArticleClassifier;
pub use events::{BatchEvent, EventPublisher, JobEvent, StepStatus};
pub use extract::{extract_structured, ParseFailure};
pub use feedback::{FeedbackError, FeedbackReceipt, FeedbackRecorder, TrainingExample};
pub use job::{InMemoryJobStore, Job, JobId, JobOverview, JobStatus, JobStore};
pub use result::{BatchSummary, ClassificationResult, StageOutcome};
pub use scheduler::{BatchRequest, BatchScheduler, SchedulerError};
pub use stage::{should_run, GateDecision, ScreenStatus, Stage};
