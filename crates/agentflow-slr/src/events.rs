//! Progress events published while a batch runs.

use agentflow_ingestion::DedupSummary;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::job::JobId;
use crate::result::{ClassificationResult, StageOutcome};
use crate::stage::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Started,
    Done,
}

/// Event payloads, tagged by `type` on the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum BatchEvent {
    #[serde(rename = "batch:start", rename_all = "camelCase")]
    Start {
        total: usize,
        dedup: DedupSummary,
        record_titles: Vec<String>,
    },
    #[serde(rename = "batch:progress")]
    Progress { progress: usize, total: usize },
    #[serde(rename = "batch:item_step", rename_all = "camelCase")]
    ItemStep {
        index: usize,
        stage: Stage,
        agent_id: String,
        status: StepStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<StageOutcome>,
    },
    #[serde(rename = "batch:done")]
    Done { results: Vec<ClassificationResult> },
    #[serde(rename = "batch:error")]
    Error { error: String },
    #[serde(rename = "batch:cancelled")]
    Cancelled { progress: usize, total: usize },
}

impl BatchEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            BatchEvent::Start { .. }     => "batch:start",
            BatchEvent::Progress { .. }  => "batch:progress",
            BatchEvent::ItemStep { .. }  => "batch:item_step",
            BatchEvent::Done { .. }      => "batch:done",
            BatchEvent::Error { .. }     => "batch:error",
            BatchEvent::Cancelled { .. } => "batch:cancelled",
        }
    }
}

/// A [`BatchEvent`] tagged with the job it came from.
#[derive(Debug, Clone, Serialize)]
pub struct JobEvent {
    #[serde(rename = "jobId")]
    pub job_id: JobId,
    #[serde(flatten)]
    pub event: BatchEvent,
}

impl JobEvent {
    pub fn new(job_id: JobId, event: BatchEvent) -> Self {
        Self { job_id, event }
    }

    pub fn kind(&self) -> &'static str {
        self.event.kind()
    }
}

/// Fan-out sink for job events.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: JobEvent);
}

impl EventPublisher for broadcast::Sender<JobEvent> {
    fn publish(&self, event: JobEvent) {
        // No subscribers is fine; events are not buffered for late joiners.
        let _ = self.send(event);
    }
}

/// Publisher that drops everything.
pub struct NullPublisher;

impl EventPublisher for NullPublisher {
    fn publish(&self, _event: JobEvent) {}
}
