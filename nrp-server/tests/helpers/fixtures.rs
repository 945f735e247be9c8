//! Upload files, app state builders and polling

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use nrp_common::events::EventBus;
use nrp_server::db::{SqliteJobLedger, SqliteReportStore};
use nrp_server::models::Job;
use nrp_server::store::{JobLedger, MemoryJobLedger, MemoryReportStore};
use nrp_server::AppState;

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const POLL_TIMEOUT: Duration = Duration::from_secs(10);

/// Write `contents` to `dir/name` as an upload would
pub fn write_upload(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("write upload fixture");
    path
}

/// Poll the ledger until the job is terminal
pub async fn wait_for_terminal(ledger: &dyn JobLedger, job_id: Uuid) -> Job {
    let deadline = tokio::time::Instant::now() + POLL_TIMEOUT;
    loop {
        let job = ledger
            .get_job(job_id)
            .await
            .expect("ledger read")
            .expect("job exists");
        if job.is_terminal() {
            return job;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {} still {} after {:?}",
            job_id,
            job.status,
            POLL_TIMEOUT
        );
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// App state over in-memory store and ledger
pub fn memory_state(upload_dir: &Path) -> (AppState, Arc<MemoryReportStore>, Arc<MemoryJobLedger>) {
    let reports = Arc::new(MemoryReportStore::new());
    let jobs = Arc::new(MemoryJobLedger::new());
    let state = AppState::new(reports.clone(), jobs.clone(), EventBus::new(100), upload_dir);
    (state, reports, jobs)
}

/// App state over a SQLite database file inside `root`
pub async fn sqlite_state(root: &Path) -> AppState {
    let pool = nrp_common::db::init_database(&root.join("nrp.db"))
        .await
        .expect("init database");
    AppState::new(
        Arc::new(SqliteReportStore::new(pool.clone())),
        Arc::new(SqliteJobLedger::new(pool)),
        EventBus::new(100),
        root.join("uploads"),
    )
}

/// Poll until `dir` holds no entries
///
/// Working files are removed after the terminal status is written, so a
/// poller can briefly see both.
pub async fn wait_until_empty(dir: &Path) {
    let deadline = tokio::time::Instant::now() + POLL_TIMEOUT;
    loop {
        let remaining = std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0);
        if remaining == 0 {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "{} still holds {} entries",
            dir.display(),
            remaining
        );
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
