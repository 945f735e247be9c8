//! SQLite report store and job ledger tests
//!
//! Run against a real database file so pooling, WAL and the schema are the
//! same as in the service.

mod helpers;

use std::sync::Arc;
use tempfile::TempDir;

use helpers::{wait_for_terminal, write_upload};
use nrp_common::events::EventBus;
use nrp_server::db::{SqliteJobLedger, SqliteReportStore, STALE_JOB_MESSAGE};
use nrp_server::models::{JobProgress, JobStatus, Report};
use nrp_server::services::ingest_orchestrator::upload_file_name;
use nrp_server::services::{aggregate, IngestOrchestrator, IngestSource};
use nrp_server::store::{JobLedger, MemoryReportStore, ReportStore, StoreError};
use sqlx::SqlitePool;

async fn test_pool() -> (TempDir, SqlitePool) {
    let dir = TempDir::new().unwrap();
    let pool = nrp_common::db::init_database(&dir.path().join("nrp.db"))
        .await
        .unwrap();
    (dir, pool)
}

fn report(org: &str, month: &str, people: f64) -> Report {
    Report {
        organization_id: org.to_string(),
        month: month.to_string(),
        people_helped: people,
        events_conducted: 1.0,
        funds_utilized: 2.5,
    }
}

#[tokio::test]
async fn test_upsert_replaces_whole_report() {
    let (_dir, pool) = test_pool().await;
    let store = SqliteReportStore::new(pool.clone());

    store.upsert_report(&report("NGO1", "2025-01", 10.0)).await.unwrap();
    store
        .upsert_report(&Report {
            events_conducted: 0.0,
            funds_utilized: 0.0,
            ..report("NGO1", "2025-01", 20.0)
        })
        .await
        .unwrap();

    let stored = store.find_report("NGO1", "2025-01").await.unwrap().unwrap();
    assert_eq!(stored.people_helped, 20.0);
    assert_eq!(stored.events_conducted, 0.0);
    assert_eq!(stored.funds_utilized, 0.0);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reports")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_non_numeric_stored_values_read_as_zero() {
    let (_dir, pool) = test_pool().await;
    let store = SqliteReportStore::new(pool.clone());

    // Rows written by other tools may hold NULL or text
    sqlx::query(
        r#"
        INSERT INTO reports (organization_id, month, people_helped, events_conducted, funds_utilized, updated_at)
        VALUES ('LEGACY', '2025-01', NULL, 'n/a', 7, '2025-01-31T00:00:00Z')
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();
    store.upsert_report(&report("NGO1", "2025-01", 3.0)).await.unwrap();

    let summary = aggregate(&store, "2025-01").await.unwrap();
    assert_eq!(summary.organization_count, 2);
    assert_eq!(summary.total_people_helped, 3.0);
    assert_eq!(summary.total_events_conducted, 1.0);
    assert_eq!(summary.total_funds_utilized, 9.5);
}

#[tokio::test]
async fn test_reports_for_month_only_matches_month() {
    let (_dir, pool) = test_pool().await;
    let store = SqliteReportStore::new(pool);

    store.upsert_report(&report("B", "2025-01", 1.0)).await.unwrap();
    store.upsert_report(&report("A", "2025-01", 1.0)).await.unwrap();
    store.upsert_report(&report("A", "2025-02", 1.0)).await.unwrap();

    let january = store.reports_for_month("2025-01").await.unwrap();
    let orgs: Vec<&str> = january.iter().map(|r| r.organization_id.as_str()).collect();
    assert_eq!(orgs, vec!["A", "B"]);

    let empty = aggregate(&store, "2099-12").await.unwrap();
    assert_eq!(empty.organization_count, 0);
    assert_eq!(empty.total_people_helped, 0.0);
}

#[tokio::test]
async fn test_ledger_lifecycle_persists() {
    let (_dir, pool) = test_pool().await;
    let ledger = SqliteJobLedger::new(pool);

    let job_id = ledger.create_job("feb.csv").await.unwrap();
    ledger.set_totals(job_id, 2).await.unwrap();
    ledger.mark_processing(job_id).await.unwrap();

    let mut progress = JobProgress::default();
    progress.record_success();
    progress.record_failure(2, vec!["Missing month".to_string(), "Month must be YYYY-MM".to_string()]);
    ledger.record_progress(job_id, &progress).await.unwrap();
    ledger.mark_completed(job_id).await.unwrap();

    let job = ledger.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.total_rows, 2);
    assert_eq!(job.progress(), progress);
    assert!(job.updated_at >= job.created_at);

    let err = ledger.set_totals(job_id, 9).await.unwrap_err();
    assert!(matches!(err, StoreError::TerminalState { .. }));
    assert_eq!(ledger.get_job(job_id).await.unwrap().unwrap().total_rows, 2);
}

#[tokio::test]
async fn test_recent_jobs_newest_first() {
    let (_dir, pool) = test_pool().await;
    let ledger = SqliteJobLedger::new(pool);

    let first = ledger.create_job("one.csv").await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = ledger.create_job("two.csv").await.unwrap();

    let jobs = ledger.recent_jobs(10).await.unwrap();
    assert_eq!(jobs.iter().map(|j| j.id).collect::<Vec<_>>(), vec![second, first]);
    assert_eq!(ledger.recent_jobs(1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_fail_stale_jobs_on_restart() {
    let (_dir, pool) = test_pool().await;
    let ledger = SqliteJobLedger::new(pool);

    let pending = ledger.create_job("pending.csv").await.unwrap();
    let processing = ledger.create_job("processing.csv").await.unwrap();
    ledger.mark_processing(processing).await.unwrap();
    let done = ledger.create_job("done.csv").await.unwrap();
    ledger.mark_processing(done).await.unwrap();
    ledger.mark_completed(done).await.unwrap();

    let mut failed = ledger.fail_stale_jobs().await.unwrap();
    failed.sort();
    let mut expected = vec![pending, processing];
    expected.sort();
    assert_eq!(failed, expected);

    for job_id in [pending, processing] {
        let job = ledger.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.errors.last().unwrap().errors, vec![STALE_JOB_MESSAGE.to_string()]);
    }
    let done = ledger.get_job(done).await.unwrap().unwrap();
    assert_eq!(done.status, JobStatus::Completed);

    assert!(ledger.fail_stale_jobs().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_restart_cleanup_removes_interrupted_job_files() {
    let (dir, pool) = test_pool().await;
    let ledger = Arc::new(SqliteJobLedger::new(pool.clone()));
    let upload_dir = dir.path().join("uploads");
    std::fs::create_dir_all(&upload_dir).unwrap();

    // Relocated working copy of a job cut off mid-run
    let interrupted = ledger.create_job("march.csv").await.unwrap();
    ledger.mark_processing(interrupted).await.unwrap();
    let working = write_upload(&upload_dir, &format!("{}-march.csv", interrupted), "ngo_id,month\n");
    // Upload saved but never handed to a job
    let orphan = write_upload(&upload_dir, &upload_file_name("april.csv"), "ngo_id,month\n");
    // Working copy of a finished job is not ours to touch, nor is anything unrelated
    let done = ledger.create_job("done.csv").await.unwrap();
    ledger.mark_processing(done).await.unwrap();
    ledger.mark_completed(done).await.unwrap();
    let finished = write_upload(&upload_dir, &format!("{}-done.csv", done), "ngo_id,month\n");
    let unrelated = write_upload(&upload_dir, "README.txt", "keep");

    let stale = ledger.fail_stale_jobs().await.unwrap();
    assert_eq!(stale, vec![interrupted]);

    let orchestrator = IngestOrchestrator::new(
        ledger.clone(),
        Arc::new(SqliteReportStore::new(pool)),
        EventBus::new(100),
        &upload_dir,
    );
    assert_eq!(orchestrator.remove_stale_files(&stale).await.unwrap(), 2);

    assert!(!working.exists());
    assert!(!orphan.exists());
    assert!(finished.exists());
    assert!(unrelated.exists());
    assert_eq!(
        ledger.get_job(interrupted).await.unwrap().unwrap().status,
        JobStatus::Failed
    );

    // Missing work dir is nothing to clean
    let empty = IngestOrchestrator::new(
        ledger,
        Arc::new(MemoryReportStore::new()),
        EventBus::new(100),
        dir.path().join("absent"),
    );
    assert_eq!(empty.remove_stale_files(&[interrupted]).await.unwrap(), 0);
}

#[tokio::test]
async fn test_pipeline_against_sqlite() {
    let (dir, pool) = test_pool().await;
    let ledger = Arc::new(SqliteJobLedger::new(pool.clone()));
    let store = Arc::new(SqliteReportStore::new(pool));
    let orchestrator = Arc::new(IngestOrchestrator::new(
        ledger.clone(),
        store.clone(),
        EventBus::new(100),
        dir.path().join("uploads"),
    ));

    let upload = write_upload(
        dir.path(),
        "upload.csv",
        "NGO ID,Month,People Helped,Events Conducted,Funds Utilized\n\
         NGO1,2025-08,10,1,100\n\
         NGO2,2025-8,5,1,50\n\
         NGO1,2025-08,15,2,150\n",
    );

    let job_id = orchestrator
        .submit(IngestSource::new(&upload, "upload.csv"))
        .await
        .unwrap();
    let job = wait_for_terminal(ledger.as_ref(), job_id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.success_count, 2);
    assert_eq!(job.failure_count, 1);
    assert_eq!(job.errors[0].row, Some(2));
    assert_eq!(job.errors[0].errors, vec!["Month must be YYYY-MM".to_string()]);

    // Duplicate key inside one file: the later row wins
    let summary = aggregate(store.as_ref(), "2025-08").await.unwrap();
    assert_eq!(summary.organization_count, 1);
    assert_eq!(summary.total_people_helped, 15.0);
    assert_eq!(summary.total_funds_utilized, 150.0);
}
