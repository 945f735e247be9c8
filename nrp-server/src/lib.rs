//! nrp-server library interface
//!
//! Exposes the router, state and services for the binary and for
//! integration tests.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::Router;
use chrono::{DateTime, Utc};
use nrp_common::events::{EventBus, NrpEvent};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::services::IngestOrchestrator;
use crate::store::{JobLedger, ReportStore};

/// Default multipart upload limit (10 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub reports: Arc<dyn ReportStore>,
    pub jobs: Arc<dyn JobLedger>,
    pub orchestrator: Arc<IngestOrchestrator>,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Where uploads are saved and relocated for processing
    pub upload_dir: PathBuf,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        reports: Arc<dyn ReportStore>,
        jobs: Arc<dyn JobLedger>,
        event_bus: EventBus,
        upload_dir: impl Into<PathBuf>,
    ) -> Self {
        let upload_dir = upload_dir.into();
        let orchestrator = Arc::new(IngestOrchestrator::new(
            Arc::clone(&jobs),
            Arc::clone(&reports),
            event_bus.clone(),
            upload_dir.clone(),
        ));

        Self {
            reports,
            jobs,
            orchestrator,
            event_bus,
            upload_dir,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn record_error(&self, message: impl Into<String>) {
        *self.last_error.write().await = Some(message.into());
    }
}

/// Router settings taken from the resolved service configuration
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// `*` allows any origin
    pub allowed_origin: String,
    pub max_upload_bytes: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            allowed_origin: "*".to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

fn cors_layer(allowed_origin: &str) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if allowed_origin == "*" {
        return layer.allow_origin(Any);
    }

    match HeaderValue::from_str(allowed_origin) {
        Ok(origin) => layer.allow_origin(origin),
        Err(e) => {
            tracing::warn!(
                allowed_origin,
                error = %e,
                "Invalid allowed origin, cross-origin requests will be refused"
            );
            layer
        }
    }
}

/// Build application router
pub fn build_router(state: AppState, config: &RouterConfig) -> Router {
    let uploads = ServeDir::new(&state.upload_dir);

    Router::new()
        .merge(api::report_routes())
        .merge(api::job_routes())
        .merge(api::dashboard_routes())
        .merge(api::health_routes())
        .route("/job-events", axum::routing::get(api::job_event_stream))
        .nest_service("/uploads", uploads)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(cors_layer(&config.allowed_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Keep `last_error` pointing at the most recent failed ingest job
pub fn spawn_failure_tracker(state: &AppState) -> JoinHandle<()> {
    let mut rx = state.event_bus.subscribe();
    let last_error = Arc::clone(&state.last_error);

    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(NrpEvent::IngestJobFailed { job_id, message, .. }) => {
                    *last_error.write().await = Some(format!("Job {}: {}", job_id, message));
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Failure tracker lagged behind event bus");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
