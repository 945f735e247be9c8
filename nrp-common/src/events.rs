//! Event types for the NRP event system
//!
//! Provides the shared event definitions and the EventBus used to fan
//! ingestion progress out to SSE clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// NRP event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NrpEvent {
    /// Upload accepted and job created in `pending`
    IngestJobAccepted {
        job_id: Uuid,
        file_name: String,
        timestamp: DateTime<Utc>,
    },

    /// Source parsed, job moved to `processing`
    IngestJobStarted {
        job_id: Uuid,
        total_rows: u64,
        timestamp: DateTime<Utc>,
    },

    /// One more row processed
    IngestJobProgress {
        job_id: Uuid,
        processed_rows: u64,
        total_rows: u64,
        success_count: u64,
        failure_count: u64,
        timestamp: DateTime<Utc>,
    },

    /// All rows attempted
    IngestJobCompleted {
        job_id: Uuid,
        success_count: u64,
        failure_count: u64,
        timestamp: DateTime<Utc>,
    },

    /// Job aborted by a fatal error
    IngestJobFailed {
        job_id: Uuid,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// A single report was written through the submission endpoint
    ReportSaved {
        organization_id: String,
        month: String,
        timestamp: DateTime<Utc>,
    },
}

impl NrpEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            NrpEvent::IngestJobAccepted { .. } => "IngestJobAccepted",
            NrpEvent::IngestJobStarted { .. } => "IngestJobStarted",
            NrpEvent::IngestJobProgress { .. } => "IngestJobProgress",
            NrpEvent::IngestJobCompleted { .. } => "IngestJobCompleted",
            NrpEvent::IngestJobFailed { .. } => "IngestJobFailed",
            NrpEvent::ReportSaved { .. } => "ReportSaved",
        }
    }

    /// Job the event belongs to, if any
    pub fn job_id(&self) -> Option<Uuid> {
        match self {
            NrpEvent::IngestJobAccepted { job_id, .. }
            | NrpEvent::IngestJobStarted { job_id, .. }
            | NrpEvent::IngestJobProgress { job_id, .. }
            | NrpEvent::IngestJobCompleted { job_id, .. }
            | NrpEvent::IngestJobFailed { job_id, .. } => Some(*job_id),
            NrpEvent::ReportSaved { .. } => None,
        }
    }
}

/// Broadcast bus for NrpEvent
///
/// Cloning is cheap; all clones share the same channel.
///
/// # Examples
///
/// ```
/// use nrp_common::events::EventBus;
///
/// let event_bus = EventBus::new(100);
/// let _rx = event_bus.subscribe();
/// assert_eq!(event_bus.subscriber_count(), 1);
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<NrpEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<NrpEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: NrpEvent) -> Result<usize, broadcast::error::SendError<NrpEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: NrpEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
