//! Database initialization
//!
//! Opens (or creates) the SQLite database and makes sure the `reports` and
//! `ingest_jobs` tables exist. Every statement is idempotent, so this runs on
//! every service start.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// SQLite busy timeout applied to every pool
pub const BUSY_TIMEOUT_MS: u64 = 250;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Connection options apply per connection, so every pooled connection
    // gets WAL and the busy timeout
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS));

    // Concurrent ingest jobs each hold a connection while writing rows
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }
    info!("Database busy timeout set to {} ms", BUSY_TIMEOUT_MS);

    create_schema(&pool).await?;

    Ok(pool)
}

/// Open a private in-memory database with the full schema
///
/// Limited to one connection: every SQLite `:memory:` connection is a
/// separate database, and the connection must never be recycled.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables and indexes
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_reports_table(pool).await?;
    create_ingest_jobs_table(pool).await?;

    info!("Database tables initialized (reports, ingest_jobs)");
    Ok(())
}

/// Monthly reports, one row per (organization_id, month)
///
/// Numeric columns are nullable so rows written by older tools are still
/// readable; readers treat NULL and non-numeric values as 0.
pub async fn create_reports_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reports (
            organization_id TEXT NOT NULL,
            month TEXT NOT NULL,
            people_helped REAL,
            events_conducted REAL,
            funds_utilized REAL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (organization_id, month)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_reports_month ON reports(month)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Bulk ingestion jobs and their progress counters
pub async fn create_ingest_jobs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ingest_jobs (
            job_id TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            source_name TEXT NOT NULL,
            total_rows INTEGER NOT NULL DEFAULT 0,
            processed_rows INTEGER NOT NULL DEFAULT 0,
            success_count INTEGER NOT NULL DEFAULT 0,
            failure_count INTEGER NOT NULL DEFAULT 0,
            errors TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_ingest_jobs_status ON ingest_jobs(status)")
        .execute(pool)
        .await?;

    Ok(())
}
