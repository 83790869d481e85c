//! Bounded worker pool that classifies a deduplicated record set.
//!
//! Records are queued with their position after dedup and truncation. Up to
//! `concurrency` workers pop from the queue, classify, and write each result
//! into the job's slot for that position, so `results[i]` always belongs to
//! record `i` whatever order the workers finish in.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use agentflow_ingestion::{deduplicate, Record};
use dashmap::DashMap;
use futures_util::FutureExt;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::classifier::ArticleClassifier;
use crate::events::{BatchEvent, EventPublisher, JobEvent};
use crate::job::{Job, JobId, JobStatus, JobStore};
use crate::result::ClassificationResult;

pub const DEFAULT_CONCURRENCY: usize = 3;

#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub records: Vec<Record>,
    /// Cap on records classified after dedup. Zero or negative means no cap.
    pub max_records: i64,
    pub concurrency: usize,
    /// Model used for every stage of this run instead of the agents' own.
    pub model_override: Option<String>,
}

impl BatchRequest {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records, max_records: 0, concurrency: DEFAULT_CONCURRENCY, model_override: None }
    }

    pub fn with_max_records(mut self, max: i64) -> Self {
        self.max_records = max;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_model_override(mut self, model: impl Into<String>) -> Self {
        self.model_override = Some(model.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Job {0} not found")]
    JobMissing(JobId),
}

type Queue = Arc<Mutex<VecDeque<(usize, Record)>>>;

pub struct BatchScheduler {
    classifier: Arc<ArticleClassifier>,
    jobs: Arc<dyn JobStore>,
    events: Arc<dyn EventPublisher>,
    cancellations: DashMap<JobId, CancellationToken>,
}

impl BatchScheduler {
    pub fn new(classifier: Arc<ArticleClassifier>, jobs: Arc<dyn JobStore>, events: Arc<dyn EventPublisher>) -> Self {
        Self { classifier, jobs, events, cancellations: DashMap::new() }
    }

    pub fn jobs(&self) -> &Arc<dyn JobStore> {
        &self.jobs
    }

    /// Register a new job in `starting` state.
    pub fn create_job(&self) -> JobId {
        let job = Job::new(JobId::new());
        let id = job.id;
        self.jobs.insert(job);
        self.cancellations.insert(id, CancellationToken::new());
        id
    }

    /// Create a job and run it on a detached task. Returns immediately.
    pub fn spawn_batch(self: &Arc<Self>, req: BatchRequest) -> JobId {
        let job_id = self.create_job();
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = this.run_batch(job_id, req).await {
                this.fail(job_id, e.to_string());
            }
        });
        job_id
    }

    /// Stop handing out queued records for a job. In-flight records finish.
    /// Returns `false` if the job is not running.
    pub fn cancel(&self, job_id: &JobId) -> bool {
        match self.cancellations.get(job_id) {
            Some(token) => {
                info!(job_id = %job_id, "batch cancellation requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Deduplicate, classify and record results for an existing job.
    pub async fn run_batch(&self, job_id: JobId, req: BatchRequest) -> Result<Vec<ClassificationResult>, SchedulerError> {
        let token = self.cancellations.entry(job_id).or_default().clone();
        let outcome = self.execute(job_id, req, token).await;
        self.cancellations.remove(&job_id);
        outcome
    }

    async fn execute(
        &self,
        job_id: JobId,
        req: BatchRequest,
        token: CancellationToken,
    ) -> Result<Vec<ClassificationResult>, SchedulerError> {
        let input_count = req.records.len();
        let outcome = deduplicate(req.records);
        let dedup = outcome.summary();
        let mut records = outcome.clean;

        let dedup_for_job = dedup.clone();
        if !self.jobs.update(&job_id, &mut |job| job.dedup = Some(dedup_for_job.clone())) {
            return Err(SchedulerError::JobMissing(job_id));
        }

        if req.max_records > 0 {
            records.truncate(usize::try_from(req.max_records).unwrap_or(usize::MAX));
        }
        let total = records.len();

        self.jobs.update(&job_id, &mut |job| {
            job.total = total;
            job.progress = 0;
            job.status = JobStatus::Screening;
            job.results = vec![None; total];
        });

        info!(job_id = %job_id, input = input_count, removed = dedup.removed, total, concurrency = req.concurrency, "batch started");
        self.events.publish(JobEvent::new(
            job_id,
            BatchEvent::Start {
                total,
                dedup,
                record_titles: records.iter().map(|r| r.title().into_owned()).collect(),
            },
        ));

        let queue: Queue = Arc::new(Mutex::new(records.into_iter().enumerate().collect()));
        let worker_count = req.concurrency.max(1).min(total);
        let model_override: Option<Arc<str>> = req.model_override.filter(|m| !m.trim().is_empty()).map(Arc::from);

        let mut workers = JoinSet::new();
        for worker in 0..worker_count {
            let ctx = Worker {
                id: worker,
                job_id,
                queue: Arc::clone(&queue),
                classifier: Arc::clone(&self.classifier),
                jobs: Arc::clone(&self.jobs),
                events: Arc::clone(&self.events),
                token: token.clone(),
                model_override: model_override.clone(),
            };
            workers.spawn(ctx.run());
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(job_id = %job_id, error = %e, "batch worker task failed");
            }
        }

        let job = self.jobs.get(&job_id).ok_or(SchedulerError::JobMissing(job_id))?;
        let results: Vec<ClassificationResult> = job.results.into_iter().flatten().collect();

        if token.is_cancelled() && job.progress < job.total {
            self.jobs.update(&job_id, &mut |job| job.status = JobStatus::Cancelled);
            info!(job_id = %job_id, progress = job.progress, total = job.total, "batch cancelled");
            self.events.publish(JobEvent::new(
                job_id,
                BatchEvent::Cancelled { progress: job.progress, total: job.total },
            ));
        } else {
            self.jobs.update(&job_id, &mut |job| job.status = JobStatus::Done);
            info!(job_id = %job_id, total = job.total, "batch done");
            self.events.publish(JobEvent::new(job_id, BatchEvent::Done { results: results.clone() }));
        }
        Ok(results)
    }

    fn fail(&self, job_id: JobId, message: String) {
        error!(job_id = %job_id, error = %message, "batch failed");
        self.jobs.update(&job_id, &mut |job| {
            job.status = JobStatus::Error;
            job.error = Some(message.clone());
        });
        self.events.publish(JobEvent::new(job_id, BatchEvent::Error { error: message }));
    }
}

struct Worker {
    id: usize,
    job_id: JobId,
    queue: Queue,
    classifier: Arc<ArticleClassifier>,
    jobs: Arc<dyn JobStore>,
    events: Arc<dyn EventPublisher>,
    token: CancellationToken,
    model_override: Option<Arc<str>>,
}

impl Worker {
    async fn run(self) {
        loop {
            if self.token.is_cancelled() {
                debug!(job_id = %self.job_id, worker = self.id, "worker stopping on cancel");
                break;
            }
            let Some((index, record)) = self.queue.lock().await.pop_front() else {
                break;
            };
            let result = self.classify(index, record).await;
            self.record(index, result);
        }
    }

    async fn classify(&self, index: usize, record: Record) -> ClassificationResult {
        let fallback = record.clone();
        let run = self.classifier.classify(record, index, self.job_id, self.model_override.as_deref());
        match AssertUnwindSafe(run).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let message = format!("SchedulerFatal: {}", panic_message(panic.as_ref()));
                error!(job_id = %self.job_id, index, error = %message, "record classification aborted");
                ClassificationResult::scheduler_fatal(fallback, index, message)
            }
        }
    }

    /// Store a result in its slot and bump progress in one update.
    fn record(&self, index: usize, result: ClassificationResult) {
        let mut result = Some(result);
        let events = &self.events;
        let job_id = self.job_id;
        self.jobs.update(&job_id, &mut |job| {
            if let (Some(slot), Some(r)) = (job.results.get_mut(index), result.take()) {
                *slot = Some(r);
            }
            job.progress += 1;
            // Published under the entry lock so progress counts arrive in order.
            events.publish(JobEvent::new(job_id, BatchEvent::Progress { progress: job.progress, total: job.total }));
        });
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "classification panicked".to_string()
    }
}
