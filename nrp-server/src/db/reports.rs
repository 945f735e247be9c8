//! SQLite report store
//!
//! One row per (organization_id, month). Writes are full replacements via
//! `INSERT .. ON CONFLICT DO UPDATE`, so concurrent writers to the same key
//! resolve as last-write-wins without any read-modify-write.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::models::Report;
use crate::store::{ReportStore, StoreResult};
use crate::utils::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

/// Numeric columns read back as REAL, NULL and non-numeric values as 0
const REPORT_COLUMNS: &str = r#"
    organization_id,
    month,
    CASE WHEN typeof(people_helped) IN ('integer', 'real') THEN CAST(people_helped AS REAL) ELSE 0.0 END AS people_helped,
    CASE WHEN typeof(events_conducted) IN ('integer', 'real') THEN CAST(events_conducted AS REAL) ELSE 0.0 END AS events_conducted,
    CASE WHEN typeof(funds_utilized) IN ('integer', 'real') THEN CAST(funds_utilized AS REAL) ELSE 0.0 END AS funds_utilized
"#;

#[derive(Clone)]
pub struct SqliteReportStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl SqliteReportStore {
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
}

fn row_to_report(row: &SqliteRow) -> StoreResult<Report> {
    Ok(Report {
        organization_id: row.try_get("organization_id")?,
        month: row.try_get("month")?,
        people_helped: row.try_get("people_helped")?,
        events_conducted: row.try_get("events_conducted")?,
        funds_utilized: row.try_get("funds_utilized")?,
    })
}

#[async_trait]
impl ReportStore for SqliteReportStore {
    async fn upsert_report(&self, report: &Report) -> StoreResult<()> {
        let pool = &self.pool;
        let updated_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let updated_at = updated_at.as_str();

        retry_on_lock("upsert_report", self.max_lock_wait_ms, move || async move {
            sqlx::query(
                r#"
                INSERT INTO reports (
                    organization_id, month,
                    people_helped, events_conducted, funds_utilized,
                    updated_at
                ) VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(organization_id, month) DO UPDATE SET
                    people_helped = excluded.people_helped,
                    events_conducted = excluded.events_conducted,
                    funds_utilized = excluded.funds_utilized,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&report.organization_id)
            .bind(&report.month)
            .bind(report.people_helped)
            .bind(report.events_conducted)
            .bind(report.funds_utilized)
            .bind(updated_at)
            .execute(pool)
            .await?;
            Ok(())
        })
        .await?;

        tracing::debug!(
            organization_id = %report.organization_id,
            month = %report.month,
            "Report upserted"
        );
        Ok(())
    }

    async fn find_report(
        &self,
        organization_id: &str,
        month: &str,
    ) -> StoreResult<Option<Report>> {
        let sql = format!(
            "SELECT {} FROM reports WHERE organization_id = ? AND month = ?",
            REPORT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(organization_id)
            .bind(month)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_report).transpose()
    }

    async fn reports_for_month(&self, month: &str) -> StoreResult<Vec<Report>> {
        let sql = format!(
            "SELECT {} FROM reports WHERE month = ? ORDER BY organization_id",
            REPORT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(month)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_report).collect()
    }
}
