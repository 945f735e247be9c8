//! Single report submission
//!
//! A submitted report goes through the same normalizer as a CSV row, so both
//! paths accept and reject exactly the same values.

use chrono::Utc;
use nrp_common::events::{EventBus, NrpEvent};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use super::normalizer::{normalize, RawRecord};
use crate::models::Report;
use crate::store::{ReportStore, StoreError};

/// Report body as sent by a client
///
/// Kept as the raw JSON object so field names resolve through the same alias
/// table as CSV headers: `ngoId`, `organizationId` and `ngo_id` may all be
/// present and the first non-empty one wins. Amounts may be JSON numbers or
/// numeric strings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct ReportSubmission {
    fields: Map<String, Value>,
}

impl ReportSubmission {
    /// Same shape the CSV parser produces; null values count as absent
    pub fn to_raw_record(&self) -> RawRecord {
        self.fields
            .iter()
            .filter_map(|(key, value)| cell_text(value).map(|text| (key.clone(), text)))
            .collect()
    }
}

fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("Invalid report: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Validate and store one report, returning what was stored
pub async fn submit_report(
    store: &dyn ReportStore,
    event_bus: &EventBus,
    submission: &ReportSubmission,
) -> Result<Report, SubmissionError> {
    let report = normalize(&submission.to_raw_record())
        .into_report()
        .map_err(SubmissionError::Invalid)?;

    store.upsert_report(&report).await?;

    tracing::info!(
        organization_id = %report.organization_id,
        month = %report.month,
        "Report saved"
    );
    event_bus.emit_lossy(NrpEvent::ReportSaved {
        organization_id: report.organization_id.clone(),
        month: report.month.clone(),
        timestamp: Utc::now(),
    });

    Ok(report)
}
