//! SQLite job ledger
//!
//! Each operation is a single guarded statement or a short transaction.
//! Status guards live in the `WHERE` clause, so a write against a finished
//! job touches no row; the ledger then reads the row back to report why.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::{Job, JobErrorEntry, JobProgress, JobStatus};
use crate::store::{JobLedger, StoreError, StoreResult};
use crate::utils::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

/// Job-level message recorded for jobs interrupted by a restart
pub const STALE_JOB_MESSAGE: &str = "Service restarted before the job finished";

const JOB_COLUMNS: &str = r#"
    job_id, status, source_name,
    total_rows, processed_rows, success_count, failure_count,
    errors, created_at, updated_at
"#;

#[derive(Clone)]
pub struct SqliteJobLedger {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str, column: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("{}: {}", column, e)))
}

fn encode_errors(errors: &[JobErrorEntry]) -> StoreResult<String> {
    serde_json::to_string(errors).map_err(|e| StoreError::Corrupt(format!("errors: {}", e)))
}

fn decode_errors(raw: &str) -> StoreResult<Vec<JobErrorEntry>> {
    serde_json::from_str(raw).map_err(|e| StoreError::Corrupt(format!("errors: {}", e)))
}

fn row_to_job(row: &SqliteRow) -> StoreResult<Job> {
    let job_id: String = row.try_get("job_id")?;
    let id = Uuid::parse_str(&job_id)
        .map_err(|e| StoreError::Corrupt(format!("job_id {}: {}", job_id, e)))?;

    let status: String = row.try_get("status")?;
    let status = status.parse::<JobStatus>().map_err(StoreError::Corrupt)?;

    let errors: String = row.try_get("errors")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Job {
        id,
        status,
        source_name: row.try_get("source_name")?,
        total_rows: row.try_get::<i64, _>("total_rows")? as u64,
        processed_rows: row.try_get::<i64, _>("processed_rows")? as u64,
        success_count: row.try_get::<i64, _>("success_count")? as u64,
        failure_count: row.try_get::<i64, _>("failure_count")? as u64,
        errors: decode_errors(&errors)?,
        created_at: parse_timestamp(&created_at, "created_at")?,
        updated_at: parse_timestamp(&updated_at, "updated_at")?,
    })
}

impl SqliteJobLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
        }
    }

    pub fn with_max_lock_wait(mut self, max_lock_wait_ms: u64) -> Self {
        self.max_lock_wait_ms = max_lock_wait_ms;
        self
    }

    async fn load_status(&self, job_id: Uuid) -> StoreResult<Option<JobStatus>> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM ingest_jobs WHERE job_id = ?")
                .bind(job_id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        status
            .map(|s| s.parse::<JobStatus>().map_err(StoreError::Corrupt))
            .transpose()
    }

    /// Explain a guarded update that matched no row
    async fn rejection(&self, job_id: Uuid, requested: Option<JobStatus>) -> StoreError {
        match self.load_status(job_id).await {
            Ok(None) => StoreError::JobNotFound(job_id),
            Ok(Some(status)) => match requested {
                Some(to) => match StoreError::check_transition(job_id, status, to) {
                    Err(err) => err,
                    Ok(()) => StoreError::Unavailable(format!(
                        "job {} update matched no row while {}",
                        job_id, status
                    )),
                },
                None if status.is_terminal() => StoreError::TerminalState { job_id, status },
                None => StoreError::Unavailable(format!(
                    "job {} update matched no row while {}",
                    job_id, status
                )),
            },
            Err(err) => err,
        }
    }

    /// Move `from → to` with a single guarded update
    async fn transition(&self, job_id: Uuid, from: JobStatus, to: JobStatus) -> StoreResult<()> {
        let pool = &self.pool;
        let id = job_id.to_string();
        let id = id.as_str();
        let now = timestamp(Utc::now());
        let now = now.as_str();

        let affected = retry_on_lock("job_transition", self.max_lock_wait_ms, move || async move {
            let result = sqlx::query(
                "UPDATE ingest_jobs SET status = ?, updated_at = ? WHERE job_id = ? AND status = ?",
            )
            .bind(to.as_str())
            .bind(now)
            .bind(id)
            .bind(from.as_str())
            .execute(pool)
            .await?;
            Ok(result.rows_affected())
        })
        .await?;

        if affected == 0 {
            return Err(self.rejection(job_id, Some(to)).await);
        }

        tracing::debug!(job_id = %job_id, from = %from, to = %to, "Job status changed");
        Ok(())
    }

    /// Fail every job left non-terminal by a previous run
    ///
    /// Background tasks do not survive a restart, so such jobs would never
    /// progress again. Returns the ids of the jobs marked failed.
    pub async fn fail_stale_jobs(&self) -> StoreResult<Vec<Uuid>> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT job_id FROM ingest_jobs WHERE status IN ('pending', 'processing') ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut failed = Vec::new();
        for raw_id in ids {
            let job_id = Uuid::parse_str(&raw_id)
                .map_err(|e| StoreError::Corrupt(format!("job_id {}: {}", raw_id, e)))?;
            match self.mark_failed(job_id, STALE_JOB_MESSAGE).await {
                Ok(()) => failed.push(job_id),
                // finished between the scan and the update
                Err(StoreError::TerminalState { .. }) => {}
                Err(err) => return Err(err),
            }
        }

        Ok(failed)
    }
}

#[async_trait]
impl JobLedger for SqliteJobLedger {
    async fn create_job(&self, source_name: &str) -> StoreResult<Uuid> {
        let job = Job::new(source_name);
        let pool = &self.pool;
        let id = job.id.to_string();
        let id = id.as_str();
        let created_at = timestamp(job.created_at);
        let created_at = created_at.as_str();

        retry_on_lock("create_job", self.max_lock_wait_ms, move || async move {
            sqlx::query(
                r#"
                INSERT INTO ingest_jobs (
                    job_id, status, source_name,
                    total_rows, processed_rows, success_count, failure_count,
                    errors, created_at, updated_at
                ) VALUES (?, ?, ?, 0, 0, 0, 0, '[]', ?, ?)
                "#,
            )
            .bind(id)
            .bind(JobStatus::Pending.as_str())
            .bind(source_name)
            .bind(created_at)
            .bind(created_at)
            .execute(pool)
            .await?;
            Ok(())
        })
        .await?;

        tracing::debug!(job_id = %job.id, source_name, "Job created");
        Ok(job.id)
    }

    async fn set_totals(&self, job_id: Uuid, total_rows: u64) -> StoreResult<()> {
        let pool = &self.pool;
        let id = job_id.to_string();
        let id = id.as_str();
        let now = timestamp(Utc::now());
        let now = now.as_str();

        let affected = retry_on_lock("set_totals", self.max_lock_wait_ms, move || async move {
            let result = sqlx::query(
                r#"
                UPDATE ingest_jobs
                SET total_rows = ?,
                    processed_rows = 0,
                    success_count = 0,
                    failure_count = 0,
                    errors = '[]',
                    updated_at = ?
                WHERE job_id = ? AND status IN ('pending', 'processing')
                "#,
            )
            .bind(total_rows as i64)
            .bind(now)
            .bind(id)
            .execute(pool)
            .await?;
            Ok(result.rows_affected())
        })
        .await?;

        if affected == 0 {
            return Err(self.rejection(job_id, None).await);
        }
        Ok(())
    }

    async fn mark_processing(&self, job_id: Uuid) -> StoreResult<()> {
        self.transition(job_id, JobStatus::Pending, JobStatus::Processing)
            .await
    }

    async fn record_progress(&self, job_id: Uuid, progress: &JobProgress) -> StoreResult<()> {
        let pool = &self.pool;
        let id = job_id.to_string();
        let id = id.as_str();
        let errors = encode_errors(&progress.errors)?;
        let errors = errors.as_str();
        let now = timestamp(Utc::now());
        let now = now.as_str();

        let affected = retry_on_lock("record_progress", self.max_lock_wait_ms, move || async move {
            let result = sqlx::query(
                r#"
                UPDATE ingest_jobs
                SET processed_rows = ?,
                    success_count = ?,
                    failure_count = ?,
                    errors = ?,
                    updated_at = ?
                WHERE job_id = ? AND status IN ('pending', 'processing')
                "#,
            )
            .bind(progress.processed_rows as i64)
            .bind(progress.success_count as i64)
            .bind(progress.failure_count as i64)
            .bind(errors)
            .bind(now)
            .bind(id)
            .execute(pool)
            .await?;
            Ok(result.rows_affected())
        })
        .await?;

        if affected == 0 {
            return Err(self.rejection(job_id, None).await);
        }
        Ok(())
    }

    async fn mark_completed(&self, job_id: Uuid) -> StoreResult<()> {
        self.transition(job_id, JobStatus::Processing, JobStatus::Completed)
            .await
    }

    async fn mark_failed(&self, job_id: Uuid, message: &str) -> StoreResult<()> {
        let pool = &self.pool;
        let id = job_id.to_string();
        let id = id.as_str();
        let now = timestamp(Utc::now());
        let now = now.as_str();

        retry_on_lock("mark_failed", self.max_lock_wait_ms, move || async move {
            let mut tx = pool.begin().await?;

            let row = sqlx::query("SELECT status, errors FROM ingest_jobs WHERE job_id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(StoreError::JobNotFound(job_id))?;

            let status: String = row.try_get("status")?;
            let status = status.parse::<JobStatus>().map_err(StoreError::Corrupt)?;
            StoreError::check_transition(job_id, status, JobStatus::Failed)?;

            let raw_errors: String = row.try_get("errors")?;
            let mut errors = decode_errors(&raw_errors)?;
            errors.push(JobErrorEntry::job_level(message));
            let errors = encode_errors(&errors)?;

            sqlx::query(
                "UPDATE ingest_jobs SET status = ?, errors = ?, updated_at = ? WHERE job_id = ?",
            )
            .bind(JobStatus::Failed.as_str())
            .bind(&errors)
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(())
        })
        .await?;

        tracing::debug!(job_id = %job_id, message, "Job marked failed");
        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> StoreResult<Option<Job>> {
        let sql = format!("SELECT {} FROM ingest_jobs WHERE job_id = ?", JOB_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(job_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_job).transpose()
    }

    async fn recent_jobs(&self, limit: u32) -> StoreResult<Vec<Job>> {
        let sql = format!(
            "SELECT {} FROM ingest_jobs ORDER BY created_at DESC, job_id LIMIT ?",
            JOB_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_job).collect()
    }
}
