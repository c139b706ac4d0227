//! Sync event types and the broadcast event bus.
//!
//! The orchestrator and dispatcher emit [`SyncEvent`]s; UI badges, telemetry
//! and tests subscribe independently. Each emission is wrapped in an
//! [`EventEnvelope`] carrying a UUIDv7 id and timestamp.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::RecordKind;
use crate::status::SyncStatus;

/// Domain events emitted by the sync engine.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    /// Status moved between two states.
    StatusChanged { from: SyncStatus, to: SyncStatus },

    /// A full-sync pass finished successfully.
    FullSyncCompleted {
        uploaded: usize,
        already_mirrored: usize,
        duration_ms: u64,
    },

    /// A full-sync pass aborted.
    FullSyncFailed { error: String },

    /// One record was upserted remotely.
    RecordSynced { kind: RecordKind, client_id: Uuid },

    /// One record's remote row was removed.
    RecordDeleted { kind: RecordKind, client_id: Uuid },

    /// Background work for one record failed.
    RecordFailed {
        kind: RecordKind,
        client_id: Uuid,
        error: String,
    },
}

impl SyncEvent {
    /// Dot-namespaced event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            SyncEvent::StatusChanged { .. } => "sync.status_changed",
            SyncEvent::FullSyncCompleted { .. } => "sync.full_completed",
            SyncEvent::FullSyncFailed { .. } => "sync.full_failed",
            SyncEvent::RecordSynced { .. } => "record.synced",
            SyncEvent::RecordDeleted { .. } => "record.deleted",
            SyncEvent::RecordFailed { .. } => "record.failed",
        }
    }
}

/// Envelope around one emitted event.
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    /// Unique event identifier (UUIDv7 for temporal ordering).
    pub event_id: Uuid,
    pub event_type: &'static str,
    pub occurred_at: DateTime<Utc>,
    pub payload: SyncEvent,
}

impl EventEnvelope {
    pub fn new(event: SyncEvent) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            event_type: event.event_type(),
            occurred_at: Utc::now(),
            payload: event,
        }
    }
}

/// Broadcast bus for sync events.
///
/// Cloning the bus shares the underlying channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Emit an event to all subscribers. Dropped silently when nobody listens.
    pub fn emit(&self, event: SyncEvent) {
        let envelope = EventEnvelope::new(event);
        tracing::debug!(
            event_type = envelope.event_type,
            event_id = %envelope.event_id,
            subscriber_count = self.tx.receiver_count(),
            "EventBus emit"
        );
        let _ = self.tx.send(envelope);
    }

    /// Subscribe to receive events. Each subscriber gets its own stream.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::defaults::EVENT_BUS_CAPACITY)
    }
}
