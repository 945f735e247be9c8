//! Ingest job status endpoints
//!
//! GET /job-status/:id, GET /jobs

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{Job, JobErrorEntry, JobStatus};
use crate::AppState;

const DEFAULT_JOB_LIMIT: u32 = 20;
const MAX_JOB_LIMIT: u32 = 100;

/// Job as reported to pollers
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub id: Uuid,
    pub status: JobStatus,
    pub file_name: String,
    pub total_rows: u64,
    pub processed_rows: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub errors: Vec<JobErrorEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Job> for JobStatusResponse {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            status: job.status,
            file_name: job.source_name,
            total_rows: job.total_rows,
            processed_rows: job.processed_rows,
            success_count: job.success_count,
            failure_count: job.failure_count,
            errors: job.errors,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct JobListQuery {
    pub limit: Option<u32>,
}

/// GET /job-status/:id
///
/// Current snapshot of one job. Unknown or malformed ids are 404.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let not_found = || ApiError::NotFound(format!("Job not found: {}", job_id));

    let id = Uuid::parse_str(&job_id).map_err(|_| not_found())?;
    let job = state.jobs.get_job(id).await?.ok_or_else(not_found)?;

    tracing::debug!(job_id = %id, status = %job.status, "Status query");
    Ok(Json(job.into()))
}

/// GET /jobs
///
/// Most recent jobs first; `limit` defaults to 20 and is capped at 100.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<JobListQuery>,
) -> ApiResult<Json<Vec<JobStatusResponse>>> {
    let limit = query.limit.unwrap_or(DEFAULT_JOB_LIMIT).clamp(1, MAX_JOB_LIMIT);
    let jobs = state.jobs.recent_jobs(limit).await?;

    Ok(Json(jobs.into_iter().map(JobStatusResponse::from).collect()))
}

/// Build job status routes
pub fn job_routes() -> Router<AppState> {
    Router::new()
        .route("/job-status/:id", get(get_job_status))
        .route("/jobs", get(list_jobs))
}
