//! Report write endpoints
//!
//! POST /report, POST /reports/upload

use axum::{
    extract::{multipart::Field, rejection::JsonRejection, Multipart, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::Report;
use crate::services::ingest_orchestrator::upload_file_name;
use crate::services::{submit_report, IngestSource, ReportSubmission, SubmissionError};
use crate::AppState;

/// Multipart field carrying the CSV upload
pub const UPLOAD_FIELD: &str = "file";

/// POST /report response
#[derive(Debug, Serialize)]
pub struct SubmitReportResponse {
    pub message: String,
    pub report: Report,
}

/// POST /reports/upload response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub job_id: Uuid,
}

/// POST /report
///
/// Validate and store one report. 201 on success, 400 with the full list of
/// validation errors otherwise.
pub async fn submit_single_report(
    State(state): State<AppState>,
    body: Result<Json<ReportSubmission>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SubmitReportResponse>)> {
    let Json(submission) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let report = match submit_report(state.reports.as_ref(), &state.event_bus, &submission).await {
        Ok(report) => report,
        Err(SubmissionError::Store(err)) => {
            state.record_error(format!("Failed to save report: {}", err)).await;
            return Err(ApiError::Store(err));
        }
        Err(err) => return Err(err.into()),
    };

    Ok((
        StatusCode::CREATED,
        Json(SubmitReportResponse {
            message: "Report saved".to_string(),
            report,
        }),
    ))
}

/// POST /reports/upload
///
/// Save the `file` part to the upload directory, create an ingest job for
/// it and return 202 with the job id. Processing happens in the background.
/// A saved upload is removed again when the request fails before the job
/// takes it over.
pub async fn upload_reports(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    let mut source: Option<IngestSource> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                if let Some(saved) = &source {
                    discard_upload(&saved.path).await;
                }
                return Err(ApiError::BadRequest(e.body_text()));
            }
        };
        if field.name() != Some(UPLOAD_FIELD) || source.is_some() {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let path = save_upload(&state.upload_dir, &file_name, field).await?;
        source = Some(IngestSource::new(path, file_name));
    }

    let source = source.ok_or_else(|| ApiError::BadRequest("CSV file is required".to_string()))?;
    let upload_path = source.path.clone();

    match state.orchestrator.submit(source).await {
        Ok(job_id) => Ok((StatusCode::ACCEPTED, Json(UploadResponse { job_id }))),
        Err(err) => {
            discard_upload(&upload_path).await;
            state.record_error(format!("Failed to create ingest job: {}", err)).await;
            Err(err.into())
        }
    }
}

/// Stream one multipart field into the upload directory
///
/// Nothing is left on disk when the transfer or the write fails.
async fn save_upload(upload_dir: &Path, file_name: &str, field: Field<'_>) -> ApiResult<PathBuf> {
    tokio::fs::create_dir_all(upload_dir).await?;
    let path = upload_dir.join(upload_file_name(file_name));

    match write_field(&path, field).await {
        Ok(written) => {
            tracing::debug!(path = %path.display(), bytes = written, "Upload saved");
            Ok(path)
        }
        Err(err) => {
            discard_upload(&path).await;
            Err(err)
        }
    }
}

async fn write_field(path: &Path, mut field: Field<'_>) -> ApiResult<u64> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written: u64 = 0;

    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    Ok(written)
}

async fn discard_upload(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove upload");
        }
    }
}

/// Build report write routes
pub fn report_routes() -> Router<AppState> {
    Router::new()
        .route("/report", post(submit_single_report))
        .route("/reports/upload", post(upload_reports))
}
