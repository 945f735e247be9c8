//! Server-Sent Events for ingest job progress
//!
//! GET /job-events[?jobId=<uuid>]

use crate::AppState;
use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use nrp_common::events::NrpEvent;
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEventsQuery {
    /// Only forward events for this job
    pub job_id: Option<Uuid>,
}

fn is_job_event(event: &NrpEvent) -> bool {
    matches!(
        event,
        NrpEvent::IngestJobAccepted { .. }
            | NrpEvent::IngestJobStarted { .. }
            | NrpEvent::IngestJobProgress { .. }
            | NrpEvent::IngestJobCompleted { .. }
            | NrpEvent::IngestJobFailed { .. }
    )
}

/// GET /job-events - SSE stream of ingest job events
///
/// Streams IngestJobAccepted, IngestJobStarted, IngestJobProgress,
/// IngestJobCompleted and IngestJobFailed. A slow client that falls behind
/// the bus skips the missed events rather than disconnecting.
pub async fn job_event_stream(
    State(state): State<AppState>,
    Query(query): Query<JobEventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(job_id = ?query.job_id, "New SSE client connected to job events");

    let mut rx = state.event_bus.subscribe();
    let job_filter = query.job_id;

    let stream = async_stream::stream! {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "SSE: client lagged, events dropped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            if !is_job_event(&event) {
                continue;
            }
            if job_filter.is_some() && event.job_id() != job_filter {
                continue;
            }

            let event_type = event.event_type().to_string();
            match serde_json::to_string(&event) {
                Ok(event_json) => {
                    debug!("SSE: Broadcasting job event: {}", event_type);
                    yield Ok(Event::default().event(event_type).data(event_json));
                }
                Err(e) => {
                    warn!("SSE: Failed to serialize event {}: {}", event_type, e);
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
