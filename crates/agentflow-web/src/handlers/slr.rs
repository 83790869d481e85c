//! SLR batch endpoints: upload, run, status, cancel, feedback.

use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use agentflow_common::{AgentFlowError, ApiError};
use agentflow_ingestion::{parse_upload, SourceDb};
use agentflow_slr::{
    BatchRequest, BatchSummary, FeedbackError, FeedbackReceipt, Job, JobId, JobOverview, JobStatus, JobStore,
    TrainingExample,
};

use crate::state::SharedState;

// === API Types ===

#[derive(Debug, Serialize)]
pub struct UploadedFile {
    pub filename: String,
    pub rows: usize,
    pub source: SourceDb,
    pub discarded: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub batch_id: Uuid,
    pub files: Vec<UploadedFile>,
    pub total_rows: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub batch_id: String,
    pub max_articles: Option<i64>,
    pub model: Option<String>,
    pub concurrency: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse {
    pub job_id: JobId,
}

#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    #[serde(flatten)]
    pub job: Job,
    pub summary: BatchSummary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub job_id: JobId,
    pub cancelled: bool,
    pub status: JobStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    #[serde(default)]
    pub agent_id: String,
    #[serde(flatten)]
    pub example: TrainingExample,
}

// === Handlers ===

/// POST /api/slr/upload — multipart field `files`, repeatable.
pub async fn upload(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut files = Vec::new();
    let mut records = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed upload: {e}")))?
    {
        if field.name() != Some("files") {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload.csv").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read {filename}: {e}")))?;

        let parsed = parse_upload(&filename, &bytes).map_err(|e| ApiError::BadRequest(e.to_string()))?;
        files.push(UploadedFile {
            filename: parsed.filename,
            rows: parsed.records.len(),
            source: parsed.source,
            discarded: parsed.discarded,
        });
        records.extend(parsed.records);
    }

    if files.is_empty() {
        return Err(ApiError::BadRequest("No files uploaded".into()));
    }

    let batch_id = Uuid::new_v4();
    let total_rows = records.len();
    state.record_sets.write().await.insert(batch_id, records);
    info!(batch_id = %batch_id, files = files.len(), total_rows, "record set stored");

    Ok(Json(UploadResponse { batch_id, files, total_rows }))
}

/// POST /api/slr/run — start a detached batch over an uploaded record set.
pub async fn run(
    State(state): State<SharedState>,
    Json(req): Json<RunRequest>,
) -> Result<Json<RunResponse>, ApiError> {
    let not_found = || ApiError::from(AgentFlowError::RecordSetNotFound(req.batch_id.clone()));
    let batch_id = Uuid::parse_str(&req.batch_id).map_err(|_| not_found())?;
    let records = state
        .record_sets
        .read()
        .await
        .get(&batch_id)
        .cloned()
        .ok_or_else(not_found)?;

    let defaults = &state.config.batch;
    let mut batch = BatchRequest::new(records)
        .with_max_records(req.max_articles.unwrap_or(defaults.max_records))
        .with_concurrency(req.concurrency.filter(|c| *c > 0).unwrap_or(defaults.concurrency));
    if let Some(model) = req.model.filter(|m| !m.trim().is_empty()) {
        batch = batch.with_model_override(model);
    }

    let job_id = state.scheduler.spawn_batch(batch);
    info!(job_id = %job_id, batch_id = %batch_id, "batch run requested");
    Ok(Json(RunResponse { job_id }))
}

fn lookup_job(state: &SharedState, raw: &str) -> Result<Job, ApiError> {
    raw.parse::<JobId>()
        .ok()
        .and_then(|id| state.jobs.get(&id))
        .ok_or_else(|| AgentFlowError::JobNotFound(raw.to_string()).into())
}

/// GET /api/slr/status/{job_id}
pub async fn status(
    State(state): State<SharedState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let job = lookup_job(&state, &job_id)?;
    let summary = job.summary();
    Ok(Json(JobStatusResponse { job, summary }))
}

/// GET /api/slr/jobs
pub async fn list_jobs(State(state): State<SharedState>) -> Json<Vec<JobOverview>> {
    Json(state.jobs.list())
}

/// POST /api/slr/jobs/{job_id}/cancel
pub async fn cancel(
    State(state): State<SharedState>,
    Path(job_id): Path<String>,
) -> Result<Json<CancelResponse>, ApiError> {
    let job = lookup_job(&state, &job_id)?;
    let cancelled = !job.status.is_finished() && state.scheduler.cancel(&job.id);
    Ok(Json(CancelResponse { job_id: job.id, cancelled, status: job.status }))
}

/// POST /api/slr/feedback
pub async fn feedback(
    State(state): State<SharedState>,
    Json(req): Json<FeedbackRequest>,
) -> Result<Json<FeedbackReceipt>, ApiError> {
    state
        .feedback
        .add_training_example(&req.agent_id, req.example)
        .await
        .map(Json)
        .map_err(feedback_error)
}

fn feedback_error(err: FeedbackError) -> ApiError {
    match err {
        FeedbackError::MissingField(_) => ApiError::BadRequest(err.to_string()),
        FeedbackError::AgentNotFound(_) => ApiError::NotFound(err.to_string()),
        FeedbackError::Store(e) => e.into(),
    }
}
