//! HTTP API handlers for nrp-server

pub mod dashboard;
pub mod health;
pub mod jobs;
pub mod reports;
pub mod sse;

pub use dashboard::dashboard_routes;
pub use health::health_routes;
pub use jobs::job_routes;
pub use reports::report_routes;
pub use sse::job_event_stream;
