//! Job state and the store that holds it.

use std::fmt;
use std::str::FromStr;

use agentflow_ingestion::DedupSummary;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::result::{BatchSummary, ClassificationResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Starting,
    Screening,
    Done,
    Error,
    Cancelled,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error | JobStatus::Cancelled)
    }
}

/// One batch run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    /// Records classified so far.
    pub progress: usize,
    pub total: usize,
    pub dedup: Option<DedupSummary>,
    /// Index-aligned with the deduplicated, truncated record list.
    pub results: Vec<Option<ClassificationResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(id: JobId) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: JobStatus::Starting,
            progress: 0,
            total: 0,
            dedup: None,
            results: Vec::new(),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary::from_results(&self.results)
    }

    pub fn overview(&self) -> JobOverview {
        JobOverview {
            id: self.id,
            status: self.status,
            progress: self.progress,
            total: self.total,
            created_at: self.created_at,
        }
    }
}

/// Listing entry without the results payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOverview {
    pub id: JobId,
    pub status: JobStatus,
    pub progress: usize,
    pub total: usize,
    pub created_at: DateTime<Utc>,
}

/// Storage for job state. Mutations go through [`JobStore::update`], which
/// applies the closure under the entry's lock.
pub trait JobStore: Send + Sync {
    fn insert(&self, job: Job);
    fn get(&self, id: &JobId) -> Option<Job>;
    /// Jobs newest first.
    fn list(&self) -> Vec<JobOverview>;
    /// Returns `false` if the job is unknown.
    fn update(&self, id: &JobId, f: &mut dyn FnMut(&mut Job)) -> bool;
}

/// Process-local [`JobStore`].
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: DashMap<JobId, Job>,
    max_retained: Option<usize>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `max` jobs, evicting the oldest finished ones. `0` keeps everything.
    pub fn with_retention(max: usize) -> Self {
        Self { jobs: DashMap::new(), max_retained: (max > 0).then_some(max) }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    fn evict(&self, max: usize) {
        let excess = self.jobs.len().saturating_sub(max);
        if excess == 0 {
            return;
        }
        let mut finished: Vec<(DateTime<Utc>, JobId)> = self
            .jobs
            .iter()
            .filter(|e| e.status.is_finished())
            .map(|e| (e.created_at, e.id))
            .collect();
        finished.sort();
        for (_, id) in finished.into_iter().take(excess) {
            self.jobs.remove(&id);
            debug!(job_id = %id, "evicted finished job");
        }
    }
}

impl JobStore for InMemoryJobStore {
    fn insert(&self, job: Job) {
        self.jobs.insert(job.id, job);
        if let Some(max) = self.max_retained {
            self.evict(max);
        }
    }

    fn get(&self, id: &JobId) -> Option<Job> {
        self.jobs.get(id).map(|j| j.clone())
    }

    fn list(&self) -> Vec<JobOverview> {
        let mut jobs: Vec<JobOverview> = self.jobs.iter().map(|j| j.overview()).collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    fn update(&self, id: &JobId, f: &mut dyn FnMut(&mut Job)) -> bool {
        match self.jobs.get_mut(id) {
            Some(mut job) => {
                f(&mut job);
                job.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }
}
