//! Bulk ingestion job runner
//!
//! Drives one uploaded CSV through its job lifecycle:
//!
//! 1. Relocate the upload to `<work_dir>/<job_id>-<file name>`
//! 2. Read and parse it into ordered raw records
//! 3. Record the row total and move the job to `processing`
//! 4. Normalize, validate and persist each row in order, recording progress
//!    after every row
//! 5. Move the job to `completed`, or to `failed` on the first fatal error
//!
//! Row problems (validation, store write) are counted and reported on the
//! job. Everything else is fatal and ends the job as `failed`; rows already
//! written stay written. The working copy is removed either way.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use nrp_common::events::{EventBus, NrpEvent};
use thiserror::Error;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::csv_parser::parse_records;
use super::normalizer::normalize;
use crate::models::{JobProgress, JobStatus};
use crate::store::{JobLedger, ReportStore, StoreError, StoreResult};

/// Row error recorded when a valid row could not be written
pub const ROW_STORE_FAILURE: &str = "DB error";

const FALLBACK_FILE_NAME: &str = "upload.csv";

/// An uploaded file waiting to be ingested
#[derive(Debug, Clone)]
pub struct IngestSource {
    /// Where the upload currently lives
    pub path: PathBuf,
    /// Name the client gave the file
    pub file_name: String,
}

impl IngestSource {
    pub fn new(path: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            file_name: file_name.into(),
        }
    }
}

/// Errors that end a job as `failed`
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Source file unreadable: {0}")]
    Unreadable(#[source] io::Error),

    #[error("Failed to move upload into work directory: {0}")]
    Relocation(#[source] io::Error),

    #[error("CSV parse failed: {0}")]
    Parse(#[from] csv::Error),

    #[error("Job ledger unavailable: {0}")]
    Ledger(#[from] StoreError),
}

/// Runs ingestion jobs in background tasks
pub struct IngestOrchestrator {
    ledger: Arc<dyn JobLedger>,
    store: Arc<dyn ReportStore>,
    event_bus: EventBus,
    work_dir: PathBuf,
}

impl IngestOrchestrator {
    pub fn new(
        ledger: Arc<dyn JobLedger>,
        store: Arc<dyn ReportStore>,
        event_bus: EventBus,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            ledger,
            store,
            event_bus,
            work_dir: work_dir.into(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Create a `pending` job for `source` and start it in the background
    ///
    /// Returns as soon as the job exists; nothing has been read yet.
    pub async fn submit(self: &Arc<Self>, source: IngestSource) -> StoreResult<Uuid> {
        let job_id = self.accept(&source).await?;
        self.spawn_job(job_id, source);
        Ok(job_id)
    }

    /// Create the `pending` job without starting it
    pub async fn accept(&self, source: &IngestSource) -> StoreResult<Uuid> {
        let job_id = self.ledger.create_job(&source.file_name).await?;

        tracing::info!(
            job_id = %job_id,
            file_name = %source.file_name,
            path = %source.path.display(),
            "Ingest job accepted"
        );
        self.event_bus.emit_lossy(NrpEvent::IngestJobAccepted {
            job_id,
            file_name: source.file_name.clone(),
            timestamp: Utc::now(),
        });

        Ok(job_id)
    }

    /// Run an accepted job on its own tokio task
    pub fn spawn_job(self: &Arc<Self>, job_id: Uuid, source: IngestSource) -> JoinHandle<JobStatus> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            tracing::debug!(job_id = %job_id, "Background ingest task started");
            orchestrator.run_job(job_id, source).await
        })
    }

    /// Run an accepted job to a terminal status
    ///
    /// Never returns an error: fatal problems are recorded on the job. If the
    /// ledger cannot record the failure either, the job is left as it was
    /// and the problem is logged.
    pub async fn run_job(&self, job_id: Uuid, source: IngestSource) -> JobStatus {
        let working_path = self.working_path(job_id, &source.file_name);

        let status = match self.process(job_id, &source, &working_path).await {
            Ok(progress) => {
                tracing::info!(
                    job_id = %job_id,
                    processed_rows = progress.processed_rows,
                    success_count = progress.success_count,
                    failure_count = progress.failure_count,
                    "Ingest job completed"
                );
                self.event_bus.emit_lossy(NrpEvent::IngestJobCompleted {
                    job_id,
                    success_count: progress.success_count,
                    failure_count: progress.failure_count,
                    timestamp: Utc::now(),
                });
                JobStatus::Completed
            }
            Err(err) => {
                self.fail(job_id, &err).await;
                JobStatus::Failed
            }
        };

        remove_working_file(job_id, &working_path).await;
        status
    }

    async fn process(
        &self,
        job_id: Uuid,
        source: &IngestSource,
        working_path: &Path,
    ) -> Result<JobProgress, IngestError> {
        tokio::fs::metadata(&source.path)
            .await
            .and_then(|meta| {
                if meta.is_file() {
                    Ok(())
                } else {
                    Err(io::Error::new(io::ErrorKind::InvalidInput, "upload is not a regular file"))
                }
            })
            .map_err(IngestError::Unreadable)?;

        self.relocate(&source.path, working_path).await?;

        let text = tokio::fs::read_to_string(working_path)
            .await
            .map_err(IngestError::Unreadable)?;
        let records = parse_records(&text)?;
        let total_rows = records.len() as u64;

        self.ledger.set_totals(job_id, total_rows).await?;
        self.ledger.mark_processing(job_id).await?;

        tracing::info!(job_id = %job_id, total_rows, "Ingest job processing");
        self.event_bus.emit_lossy(NrpEvent::IngestJobStarted {
            job_id,
            total_rows,
            timestamp: Utc::now(),
        });

        let mut progress = JobProgress::default();
        for (index, record) in records.iter().enumerate() {
            let row = index as u64 + 1;

            match normalize(record).into_report() {
                Err(errors) => {
                    tracing::debug!(job_id = %job_id, row, ?errors, "Row rejected");
                    progress.record_failure(row, errors);
                }
                Ok(report) => match self.store.upsert_report(&report).await {
                    Ok(()) => progress.record_success(),
                    Err(err) => {
                        tracing::warn!(
                            job_id = %job_id,
                            row,
                            error = %err,
                            "Row could not be stored"
                        );
                        progress.record_failure(row, vec![ROW_STORE_FAILURE.to_string()]);
                    }
                },
            }

            self.ledger.record_progress(job_id, &progress).await?;
            self.event_bus.emit_lossy(NrpEvent::IngestJobProgress {
                job_id,
                processed_rows: progress.processed_rows,
                total_rows,
                success_count: progress.success_count,
                failure_count: progress.failure_count,
                timestamp: Utc::now(),
            });
        }

        self.ledger.mark_completed(job_id).await?;
        Ok(progress)
    }

    /// Move the upload into the work directory
    ///
    /// Falls back to copy + remove when a rename is not possible (e.g. the
    /// upload and work directories are on different filesystems).
    async fn relocate(&self, from: &Path, to: &Path) -> Result<(), IngestError> {
        tokio::fs::create_dir_all(&self.work_dir)
            .await
            .map_err(IngestError::Relocation)?;

        if let Err(rename_err) = tokio::fs::rename(from, to).await {
            tracing::debug!(
                from = %from.display(),
                to = %to.display(),
                error = %rename_err,
                "Rename failed, copying upload instead"
            );
            tokio::fs::copy(from, to)
                .await
                .map_err(IngestError::Relocation)?;
            if let Err(e) = tokio::fs::remove_file(from).await {
                tracing::warn!(path = %from.display(), error = %e, "Failed to remove original upload");
            }
        }
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, err: &IngestError) {
        let message = err.to_string();
        tracing::error!(job_id = %job_id, error = %message, "Ingest job failed");

        match self.ledger.mark_failed(job_id, &message).await {
            Ok(()) => {
                self.event_bus.emit_lossy(NrpEvent::IngestJobFailed {
                    job_id,
                    message,
                    timestamp: Utc::now(),
                });
            }
            Err(ledger_err) => {
                tracing::error!(
                    job_id = %job_id,
                    error = %ledger_err,
                    "Could not record job failure; job left non-terminal"
                );
            }
        }
    }

    /// Remove files left in the work dir by jobs that will never run again
    ///
    /// Deletes the working copies of `job_ids` and every upload that was
    /// saved but never relocated. Only call this while no job is running.
    pub async fn remove_stale_files(&self, job_ids: &[Uuid]) -> io::Result<usize> {
        let prefixes: Vec<String> = job_ids.iter().map(|id| format!("{}-", id)).collect();

        let mut entries = match tokio::fs::read_dir(&self.work_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let stale = is_upload_file_name(name)
                || prefixes.iter().any(|prefix| name.starts_with(prefix.as_str()));
            if !stale || !entry.file_type().await?.is_file() {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }

        if removed > 0 {
            tracing::info!(work_dir = %self.work_dir.display(), removed, "Removed stale upload files");
        }
        Ok(removed)
    }

    fn working_path(&self, job_id: Uuid, file_name: &str) -> PathBuf {
        self.work_dir
            .join(format!("{}-{}", job_id, sanitize_file_name(file_name)))
    }
}

async fn remove_working_file(job_id: Uuid, path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(job_id = %job_id, path = %path.display(), "Working file removed"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(
            job_id = %job_id,
            path = %path.display(),
            error = %e,
            "Failed to remove working file"
        ),
    }
}

/// Name for a freshly saved upload: `<millis>-<8 hex>-<sanitized name>`
pub fn upload_file_name(original: &str) -> String {
    let unique = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}",
        Utc::now().timestamp_millis(),
        &unique[..8],
        sanitize_file_name(original)
    )
}

/// Whether `name` was produced by [`upload_file_name`]
pub fn is_upload_file_name(name: &str) -> bool {
    let mut parts = name.splitn(3, '-');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(millis), Some(unique), Some(rest)) => {
            !millis.is_empty()
                && millis.bytes().all(|b| b.is_ascii_digit())
                && unique.len() == 8
                && unique.bytes().all(|b| b.is_ascii_hexdigit())
                && !rest.is_empty()
        }
        _ => false,
    }
}

/// Reduce a client-supplied file name to a safe single path component
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        FALLBACK_FILE_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryJobLedger, MemoryReportStore};
    use tempfile::TempDir;

    fn orchestrator(dir: &TempDir) -> (Arc<IngestOrchestrator>, Arc<MemoryJobLedger>, Arc<MemoryReportStore>) {
        let ledger = Arc::new(MemoryJobLedger::new());
        let store = Arc::new(MemoryReportStore::new());
        let orchestrator = Arc::new(IngestOrchestrator::new(
            ledger.clone(),
            store.clone(),
            EventBus::new(64),
            dir.path().join("work"),
        ));
        (orchestrator, ledger, store)
    }

    #[test]
    fn test_upload_file_name_recognized() {
        let name = upload_file_name("../march report.csv");
        assert!(name.ends_with("-march_report.csv"));
        assert!(is_upload_file_name(&name));

        let working = format!("{}-march.csv", Uuid::new_v4());
        assert!(!is_upload_file_name(&working));
        assert!(!is_upload_file_name("notes.txt"));
        assert!(!is_upload_file_name("2025-01-report.csv"));
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("reports.csv"), "reports.csv");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\data\\jan 2025.csv"), "jan_2025.csv");
        assert_eq!(sanitize_file_name(".."), "upload.csv");
        assert_eq!(sanitize_file_name(""), "upload.csv");
    }

    #[tokio::test]
    async fn test_run_job_completes_and_removes_working_file() {
        let dir = TempDir::new().unwrap();
        let (orchestrator, ledger, store) = orchestrator(&dir);

        let upload = dir.path().join("upload.csv");
        std::fs::write(&upload, "ngo_id,month,people_helped\nNGO1,2025-01,5\n,2025-01,1\n").unwrap();
        let source = IngestSource::new(&upload, "january.csv");

        let job_id = orchestrator.accept(&source).await.unwrap();
        let status = orchestrator.run_job(job_id, source).await;
        assert_eq!(status, JobStatus::Completed);

        let job = ledger.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.total_rows, 2);
        assert_eq!(job.success_count, 1);
        assert_eq!(job.failure_count, 1);
        assert_eq!(job.errors[0].row, Some(2));
        assert_eq!(store.len().await, 1);

        assert!(!upload.exists());
        let leftovers = std::fs::read_dir(orchestrator.work_dir()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_missing_upload_fails_job() {
        let dir = TempDir::new().unwrap();
        let (orchestrator, ledger, _store) = orchestrator(&dir);

        let source = IngestSource::new(dir.path().join("gone.csv"), "gone.csv");
        let job_id = orchestrator.accept(&source).await.unwrap();
        let status = orchestrator.run_job(job_id, source).await;
        assert_eq!(status, JobStatus::Failed);

        let job = ledger.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.processed_rows, 0);
        assert_eq!(job.errors.len(), 1);
        assert!(job.errors[0].is_job_level());
        assert!(job.errors[0].errors[0].starts_with("Source file unreadable"));
    }
}
