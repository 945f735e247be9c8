//! In-process report store and job ledger
//!
//! Same contracts as the SQLite implementations, backed by maps behind a
//! tokio `RwLock`. Used by tests and by embedders that do not need
//! persistence.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{JobLedger, ReportStore, StoreError, StoreResult};
use crate::models::{Job, JobErrorEntry, JobProgress, JobStatus, Report, ReportKey};

#[derive(Default)]
pub struct MemoryReportStore {
    reports: RwLock<HashMap<ReportKey, Report>>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.reports.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.reports.read().await.is_empty()
    }
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    async fn upsert_report(&self, report: &Report) -> StoreResult<()> {
        self.reports
            .write()
            .await
            .insert(report.key(), report.clone());
        Ok(())
    }

    async fn find_report(
        &self,
        organization_id: &str,
        month: &str,
    ) -> StoreResult<Option<Report>> {
        let key = ReportKey {
            organization_id: organization_id.to_string(),
            month: month.to_string(),
        };
        Ok(self.reports.read().await.get(&key).cloned())
    }

    async fn reports_for_month(&self, month: &str) -> StoreResult<Vec<Report>> {
        let reports = self.reports.read().await;
        let mut matching: Vec<Report> = reports
            .values()
            .filter(|r| r.month == month)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.organization_id.cmp(&b.organization_id));
        Ok(matching)
    }
}

#[derive(Default)]
pub struct MemoryJobLedger {
    jobs: RwLock<HashMap<Uuid, Job>>,
}

impl MemoryJobLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `update` to a job after checking it is not terminal
    async fn mutate<F>(&self, job_id: Uuid, update: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Job) -> StoreResult<()> + Send,
    {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&job_id).ok_or(StoreError::JobNotFound(job_id))?;
        if job.is_terminal() {
            return Err(StoreError::TerminalState {
                job_id,
                status: job.status,
            });
        }
        update(job)?;
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn transition(&self, job_id: Uuid, to: JobStatus) -> StoreResult<()> {
        self.mutate(job_id, |job| {
            StoreError::check_transition(job_id, job.status, to)?;
            job.status = to;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl JobLedger for MemoryJobLedger {
    async fn create_job(&self, source_name: &str) -> StoreResult<Uuid> {
        let job = Job::new(source_name);
        let job_id = job.id;
        self.jobs.write().await.insert(job_id, job);
        Ok(job_id)
    }

    async fn set_totals(&self, job_id: Uuid, total_rows: u64) -> StoreResult<()> {
        self.mutate(job_id, |job| {
            job.total_rows = total_rows;
            job.apply_progress(&JobProgress::default());
            Ok(())
        })
        .await
    }

    async fn mark_processing(&self, job_id: Uuid) -> StoreResult<()> {
        self.transition(job_id, JobStatus::Processing).await
    }

    async fn record_progress(&self, job_id: Uuid, progress: &JobProgress) -> StoreResult<()> {
        let progress = progress.clone();
        self.mutate(job_id, move |job| {
            job.apply_progress(&progress);
            Ok(())
        })
        .await
    }

    async fn mark_completed(&self, job_id: Uuid) -> StoreResult<()> {
        self.transition(job_id, JobStatus::Completed).await
    }

    async fn mark_failed(&self, job_id: Uuid, message: &str) -> StoreResult<()> {
        let entry = JobErrorEntry::job_level(message);
        self.mutate(job_id, move |job| {
            StoreError::check_transition(job_id, job.status, JobStatus::Failed)?;
            job.status = JobStatus::Failed;
            job.errors.push(entry);
            Ok(())
        })
        .await
    }

    async fn get_job(&self, job_id: Uuid) -> StoreResult<Option<Job>> {
        Ok(self.jobs.read().await.get(&job_id).cloned())
    }

    async fn recent_jobs(&self, limit: u32) -> StoreResult<Vec<Job>> {
        let jobs = self.jobs.read().await;
        let mut all: Vec<Job> = jobs.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all.truncate(limit as usize);
        Ok(all)
    }
}
