//! Ingestion job state machine
//!
//! A job moves through `pending → processing → completed | failed` and never
//! goes back. `processed_rows` always equals `success_count + failure_count`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Accepted, source not parsed yet
    Pending,
    /// Source relocated and parsed, rows being processed
    Processing,
    /// Every row attempted
    Completed,
    /// Aborted by a fatal error
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether `self → next` is a legal lifecycle step
    ///
    /// `failed` is reachable from both non-terminal states because a fatal
    /// error can happen before or after parsing. `completed` requires
    /// `processing`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("Unknown job status: {}", other)),
        }
    }
}

/// One entry of a job's error report
///
/// Row-level entries carry the 1-based source row. Job-level entries (the
/// fatal message recorded by `mark_failed`) have no row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobErrorEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<u64>,
    pub errors: Vec<String>,
}

impl JobErrorEntry {
    pub fn row(row: u64, errors: Vec<String>) -> Self {
        Self {
            row: Some(row),
            errors,
        }
    }

    pub fn job_level(message: impl Into<String>) -> Self {
        Self {
            row: None,
            errors: vec![message.into()],
        }
    }

    pub fn is_job_level(&self) -> bool {
        self.row.is_none()
    }
}

/// Progress counters written to the ledger as one unit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    pub processed_rows: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub errors: Vec<JobErrorEntry>,
}

impl JobProgress {
    /// Count one persisted row
    pub fn record_success(&mut self) {
        self.success_count += 1;
        self.processed_rows += 1;
    }

    /// Count one rejected row and its error list
    pub fn record_failure(&mut self, row: u64, errors: Vec<String>) {
        self.failure_count += 1;
        self.processed_rows += 1;
        self.errors.push(JobErrorEntry::row(row, errors));
    }

    pub fn is_consistent(&self) -> bool {
        self.processed_rows == self.success_count + self.failure_count
    }
}

/// Ingestion job as stored in the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub status: JobStatus,
    /// Original upload file name, display only
    pub source_name: String,
    /// 0 until the source has been parsed
    pub total_rows: u64,
    pub processed_rows: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub errors: Vec<JobErrorEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// New job in `pending` with every counter at zero
    pub fn new(source_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status: JobStatus::Pending,
            source_name: source_name.into(),
            total_rows: 0,
            processed_rows: 0,
            success_count: 0,
            failure_count: 0,
            errors: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn progress(&self) -> JobProgress {
        JobProgress {
            processed_rows: self.processed_rows,
            success_count: self.success_count,
            failure_count: self.failure_count,
            errors: self.errors.clone(),
        }
    }

    pub fn apply_progress(&mut self, progress: &JobProgress) {
        self.processed_rows = progress.processed_rows;
        self.success_count = progress.success_count;
        self.failure_count = progress.failure_count;
        self.errors = progress.errors.clone();
        self.updated_at = Utc::now();
    }
}
