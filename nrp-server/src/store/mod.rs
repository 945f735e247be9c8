//! Storage seams for reports and ingestion jobs
//!
//! The orchestrator, aggregator and HTTP handlers only see these traits.
//! `crate::db` provides the SQLite implementations used by the service and
//! [`memory`] provides in-process ones for tests and embedding.

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Job, JobProgress, JobStatus, Report};

pub use memory::{MemoryJobLedger, MemoryReportStore};

/// Result type for store and ledger operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a report store or job ledger
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying database failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Store could not be reached or refused the write
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Unknown job id
    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    /// Mutation attempted on a job that already finished
    #[error("Job {job_id} is already {status}")]
    TerminalState { job_id: Uuid, status: JobStatus },

    /// Lifecycle step that would skip or revisit a state
    #[error("Job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },

    /// Stored value could not be decoded
    #[error("Corrupt stored value: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// SQLite reported lock contention; the operation may succeed if retried
    pub fn is_lock_contention(&self) -> bool {
        match self {
            StoreError::Database(sqlx::Error::Database(db_err)) => {
                db_err.message().contains("database is locked")
                    || matches!(db_err.code().as_deref(), Some("5") | Some("6"))
            }
            _ => false,
        }
    }

    /// Check a requested lifecycle step against the job's current status
    pub fn check_transition(job_id: Uuid, from: JobStatus, to: JobStatus) -> StoreResult<()> {
        if from.is_terminal() {
            return Err(StoreError::TerminalState {
                job_id,
                status: from,
            });
        }
        if !from.can_transition_to(to) {
            return Err(StoreError::InvalidTransition { job_id, from, to });
        }
        Ok(())
    }
}

/// Persistent collection of monthly reports keyed by (organization_id, month)
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Create or fully replace the report at the report's key
    async fn upsert_report(&self, report: &Report) -> StoreResult<()>;

    /// Report stored for one key
    async fn find_report(&self, organization_id: &str, month: &str)
        -> StoreResult<Option<Report>>;

    /// Every report whose month equals `month`
    async fn reports_for_month(&self, month: &str) -> StoreResult<Vec<Report>>;
}

/// Persistent job metadata and progress counters
///
/// Mutations on a job in a terminal state fail with
/// [`StoreError::TerminalState`] and leave the job untouched.
#[async_trait]
pub trait JobLedger: Send + Sync {
    /// Insert a new `pending` job with zeroed counters
    async fn create_job(&self, source_name: &str) -> StoreResult<Uuid>;

    /// Record the parsed row count and reset progress counters
    async fn set_totals(&self, job_id: Uuid, total_rows: u64) -> StoreResult<()>;

    /// `pending → processing`
    async fn mark_processing(&self, job_id: Uuid) -> StoreResult<()>;

    /// Overwrite processed/success/failure counters and the error list together
    async fn record_progress(&self, job_id: Uuid, progress: &JobProgress) -> StoreResult<()>;

    /// `processing → completed`
    async fn mark_completed(&self, job_id: Uuid) -> StoreResult<()>;

    /// Move to `failed` and append `message` as a job-level error
    async fn mark_failed(&self, job_id: Uuid, message: &str) -> StoreResult<()>;

    async fn get_job(&self, job_id: Uuid) -> StoreResult<Option<Job>>;

    /// Most recently created jobs first
    async fn recent_jobs(&self, limit: u32) -> StoreResult<Vec<Job>>;
}
