//! Dashboard month aggregate

use std::collections::HashSet;

use crate::models::{MonthlyAggregate, Report};
use crate::store::{ReportStore, StoreResult};

/// Totals across every report stored for `month`
pub async fn aggregate(store: &dyn ReportStore, month: &str) -> StoreResult<MonthlyAggregate> {
    let reports = store.reports_for_month(month).await?;
    let summary = summarize(month, &reports);

    tracing::debug!(
        month,
        organization_count = summary.organization_count,
        "Dashboard aggregate computed"
    );
    Ok(summary)
}

/// Sum a month's reports; organizations are counted once however many rows they have
pub fn summarize(month: &str, reports: &[Report]) -> MonthlyAggregate {
    let mut organizations = HashSet::new();
    let mut summary = MonthlyAggregate::empty(month);

    for report in reports.iter().filter(|r| r.month == month) {
        organizations.insert(report.organization_id.as_str());
        summary.total_people_helped += finite_or_zero(report.people_helped);
        summary.total_events_conducted += finite_or_zero(report.events_conducted);
        summary.total_funds_utilized += finite_or_zero(report.funds_utilized);
    }

    summary.organization_count = organizations.len() as u64;
    summary
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryReportStore;

    fn report(org: &str, month: &str, people: f64, events: f64, funds: f64) -> Report {
        Report {
            organization_id: org.to_string(),
            month: month.to_string(),
            people_helped: people,
            events_conducted: events,
            funds_utilized: funds,
        }
    }

    #[test]
    fn test_empty_month_is_all_zero() {
        assert_eq!(summarize("2025-01", &[]), MonthlyAggregate::empty("2025-01"));
    }

    #[test]
    fn test_distinct_organizations_counted_once() {
        let reports = vec![
            report("A", "2025-01", 1.0, 1.0, 1.0),
            report("A", "2025-01", 2.0, 0.0, 0.0),
            report("B", "2025-01", 3.0, 2.0, 10.5),
            report("C", "2025-02", 100.0, 100.0, 100.0),
        ];

        let summary = summarize("2025-01", &reports);
        assert_eq!(summary.organization_count, 2);
        assert_eq!(summary.total_people_helped, 6.0);
        assert_eq!(summary.total_events_conducted, 3.0);
        assert_eq!(summary.total_funds_utilized, 11.5);
    }

    #[test]
    fn test_non_finite_values_count_as_zero() {
        let reports = vec![report("A", "2025-01", f64::NAN, 1.0, f64::INFINITY)];

        let summary = summarize("2025-01", &reports);
        assert_eq!(summary.total_people_helped, 0.0);
        assert_eq!(summary.total_events_conducted, 1.0);
        assert_eq!(summary.total_funds_utilized, 0.0);
    }

    #[tokio::test]
    async fn test_aggregate_reads_store() {
        let store = MemoryReportStore::new();
        store.upsert_report(&report("A", "2025-03", 4.0, 1.0, 50.0)).await.unwrap();
        store.upsert_report(&report("B", "2025-03", 6.0, 2.0, 25.0)).await.unwrap();

        let summary = aggregate(&store, "2025-03").await.unwrap();
        assert_eq!(summary.month, "2025-03");
        assert_eq!(summary.organization_count, 2);
        assert_eq!(summary.total_people_helped, 10.0);
        assert_eq!(summary.total_funds_utilized, 75.0);
    }
}
