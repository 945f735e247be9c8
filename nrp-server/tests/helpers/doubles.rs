//! Store and ledger doubles with injectable failures

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use uuid::Uuid;

use nrp_server::models::{Job, JobProgress, JobStatus, Report};
use nrp_server::store::{
    JobLedger, MemoryJobLedger, MemoryReportStore, ReportStore, StoreError, StoreResult,
};

/// Report store that refuses writes for chosen organizations
#[derive(Default)]
pub struct SelectiveReportStore {
    inner: MemoryReportStore,
    failing_orgs: HashSet<String>,
}

impl SelectiveReportStore {
    pub fn failing_for(orgs: &[&str]) -> Self {
        Self {
            inner: MemoryReportStore::new(),
            failing_orgs: orgs.iter().map(|o| o.to_string()).collect(),
        }
    }

    pub fn inner(&self) -> &MemoryReportStore {
        &self.inner
    }
}

#[async_trait]
impl ReportStore for SelectiveReportStore {
    async fn upsert_report(&self, report: &Report) -> StoreResult<()> {
        if self.failing_orgs.contains(&report.organization_id) {
            return Err(StoreError::Unavailable(format!(
                "write refused for {}",
                report.organization_id
            )));
        }
        self.inner.upsert_report(report).await
    }

    async fn find_report(&self, organization_id: &str, month: &str) -> StoreResult<Option<Report>> {
        self.inner.find_report(organization_id, month).await
    }

    async fn reports_for_month(&self, month: &str) -> StoreResult<Vec<Report>> {
        self.inner.reports_for_month(month).await
    }
}

/// In-memory ledger that records every write and can fail job creation or
/// progress updates
#[derive(Default)]
pub struct FlakyJobLedger {
    inner: MemoryJobLedger,
    fail_create: bool,
    /// `record_progress` fails once `processed_rows` reaches this value
    fail_progress_at: Option<u64>,
    snapshots: Mutex<Vec<JobProgress>>,
    statuses: Mutex<Vec<JobStatus>>,
}

impl FlakyJobLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_progress_at(processed_rows: u64) -> Self {
        Self {
            fail_progress_at: Some(processed_rows),
            ..Self::default()
        }
    }

    pub fn failing_create() -> Self {
        Self {
            fail_create: true,
            ..Self::default()
        }
    }

    /// Every progress snapshot the ledger accepted, in order
    pub fn snapshots(&self) -> Vec<JobProgress> {
        self.snapshots.lock().unwrap().clone()
    }

    /// Every status the job was put in, starting with `pending`
    pub fn status_history(&self) -> Vec<JobStatus> {
        self.statuses.lock().unwrap().clone()
    }

    fn push_status(&self, status: JobStatus) {
        self.statuses.lock().unwrap().push(status);
    }
}

#[async_trait]
impl JobLedger for FlakyJobLedger {
    async fn create_job(&self, source_name: &str) -> StoreResult<Uuid> {
        if self.fail_create {
            return Err(StoreError::Unavailable("ledger connection lost".to_string()));
        }
        let job_id = self.inner.create_job(source_name).await?;
        self.push_status(JobStatus::Pending);
        Ok(job_id)
    }

    async fn set_totals(&self, job_id: Uuid, total_rows: u64) -> StoreResult<()> {
        self.inner.set_totals(job_id, total_rows).await
    }

    async fn mark_processing(&self, job_id: Uuid) -> StoreResult<()> {
        self.inner.mark_processing(job_id).await?;
        self.push_status(JobStatus::Processing);
        Ok(())
    }

    async fn record_progress(&self, job_id: Uuid, progress: &JobProgress) -> StoreResult<()> {
        if self.fail_progress_at == Some(progress.processed_rows) {
            return Err(StoreError::Unavailable("ledger connection lost".to_string()));
        }
        self.inner.record_progress(job_id, progress).await?;
        self.snapshots.lock().unwrap().push(progress.clone());
        Ok(())
    }

    async fn mark_completed(&self, job_id: Uuid) -> StoreResult<()> {
        self.inner.mark_completed(job_id).await?;
        self.push_status(JobStatus::Completed);
        Ok(())
    }

    async fn mark_failed(&self, job_id: Uuid, message: &str) -> StoreResult<()> {
        self.inner.mark_failed(job_id, message).await?;
        self.push_status(JobStatus::Failed);
        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> StoreResult<Option<Job>> {
        self.inner.get_job(job_id).await
    }

    async fn recent_jobs(&self, limit: u32) -> StoreResult<Vec<Job>> {
        self.inner.recent_jobs(limit).await
    }
}
