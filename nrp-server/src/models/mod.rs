//! Data models for nrp-server
//!
//! - Ingestion job state machine and progress counters
//! - Monthly report and its month aggregate

pub mod job;
pub mod report;

pub use job::{Job, JobErrorEntry, JobProgress, JobStatus};
pub use report::{MonthlyAggregate, Report, ReportKey};
