//! SQLite implementations of the storage seams
//!
//! Schema creation lives in `nrp_common::db`; this module only reads and
//! writes rows.

pub mod jobs;
pub mod reports;

pub use jobs::{SqliteJobLedger, STALE_JOB_MESSAGE};
pub use reports::SqliteReportStore;
