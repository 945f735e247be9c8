//! Monthly activity report and month aggregate

use serde::{Deserialize, Serialize};

/// Composite identity of a report
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReportKey {
    pub organization_id: String,
    pub month: String,
}

/// One organization's activity for one month
///
/// At most one report exists per (organization_id, month); a new write
/// replaces every field of the previous one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub organization_id: String,
    /// `YYYY-MM`
    pub month: String,
    pub people_helped: f64,
    pub events_conducted: f64,
    pub funds_utilized: f64,
}

impl Report {
    pub fn key(&self) -> ReportKey {
        ReportKey {
            organization_id: self.organization_id.clone(),
            month: self.month.clone(),
        }
    }
}

/// Month-scoped dashboard figures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyAggregate {
    pub month: String,
    /// Distinct organizations with a report for the month
    pub organization_count: u64,
    pub total_people_helped: f64,
    pub total_events_conducted: f64,
    pub total_funds_utilized: f64,
}

impl MonthlyAggregate {
    pub fn empty(month: impl Into<String>) -> Self {
        Self {
            month: month.into(),
            organization_count: 0,
            total_people_helped: 0.0,
            total_events_conducted: 0.0,
            total_funds_utilized: 0.0,
        }
    }
}
