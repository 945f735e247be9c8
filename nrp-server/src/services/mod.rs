//! Reporting services
//!
//! - Record normalization and validation shared by every write path
//! - CSV batch parsing
//! - Background ingestion jobs
//! - Dashboard aggregation
//! - Single report submission

pub mod aggregator;
pub mod csv_parser;
pub mod ingest_orchestrator;
pub mod normalizer;
pub mod report_submission;

pub use aggregator::{aggregate, summarize};
pub use csv_parser::parse_records;
pub use ingest_orchestrator::{IngestError, IngestOrchestrator, IngestSource, ROW_STORE_FAILURE};
pub use normalizer::{normalize, NormalizedRow, RawRecord};
pub use report_submission::{submit_report, ReportSubmission, SubmissionError};
