//! Event system for relationship, ACL and migration operations
//!
//! Services emit after their transaction commits, so listeners never see
//! events for rolled-back work. Typical listeners:
//! - Audit logging
//! - Notification fan-out
//! - Cache invalidation

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

use crate::db::RelationshipRow;

/// Events emitted by services and the migration runner
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GrcEvent {
    // Relationship events
    RelationshipCreated {
        id: i64,
        source_type: String,
        source_id: i64,
        destination_type: String,
        destination_id: i64,
    },
    RelationshipDeleted {
        id: i64,
        source_type: String,
        source_id: i64,
        destination_type: String,
        destination_id: i64,
    },

    // Action events
    RelatedObjectsAdded {
        parent_type: String,
        parent_id: i64,
        kind: String,
        ids: Vec<i64>,
    },

    // ACL events
    AclGranted {
        entry_id: i64,
        person_id: i64,
        role: String,
        object_type: String,
        object_id: i64,
        derived: usize,
    },
    AclRevoked {
        entry_ids: Vec<i64>,
    },

    // Migration events
    MigrationApplied {
        revision: String,
        direct_entries: usize,
        mapped_entries: usize,
    },
    MigrationReverted {
        revision: String,
    },
}

impl GrcEvent {
    pub fn relationship_created(row: &RelationshipRow) -> Self {
        GrcEvent::RelationshipCreated {
            id: row.id,
            source_type: row.source_type.clone(),
            source_id: row.source_id,
            destination_type: row.destination_type.clone(),
            destination_id: row.destination_id,
        }
    }

    pub fn relationship_deleted(row: &RelationshipRow) -> Self {
        GrcEvent::RelationshipDeleted {
            id: row.id,
            source_type: row.source_type.clone(),
            source_id: row.source_id,
            destination_type: row.destination_type.clone(),
            destination_id: row.destination_id,
        }
    }
}

/// Trait for event listeners
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &GrcEvent);
}

/// Event bus for broadcasting events
pub struct EventBus {
    sender: broadcast::Sender<GrcEvent>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: GrcEvent) {
        trace!(event = ?event, "Emitting event");
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GrcEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Logging event listener for audit trails
pub struct LoggingEventListener;

impl EventListener for LoggingEventListener {
    fn on_event(&self, event: &GrcEvent) {
        match event {
            GrcEvent::RelationshipCreated {
                source_type,
                source_id,
                destination_type,
                destination_id,
                ..
            } => {
                debug!(
                    source = %format!("{}:{}", source_type, source_id),
                    destination = %format!("{}:{}", destination_type, destination_id),
                    "Relationship created"
                );
            }
            GrcEvent::RelationshipDeleted { id, .. } => {
                debug!(id = id, "Relationship deleted");
            }
            GrcEvent::AclGranted {
                person_id,
                role,
                object_type,
                object_id,
                derived,
                ..
            } => {
                debug!(
                    person_id = person_id,
                    role = %role,
                    object = %format!("{}:{}", object_type, object_id),
                    derived = derived,
                    "ACL granted"
                );
            }
            GrcEvent::MigrationApplied {
                revision,
                direct_entries,
                mapped_entries,
            } => {
                info!(
                    revision = %revision,
                    direct = direct_entries,
                    mapped = mapped_entries,
                    "Migration applied"
                );
            }
            GrcEvent::MigrationReverted { revision } => {
                info!(revision = %revision, "Migration reverted");
            }
            _ => {
                trace!(event = ?event, "Event");
            }
        }
    }
}

/// Spawn a background task that logs all events
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();
    let listener = LoggingEventListener;

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => listener.on_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Event listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, stopping listener");
                    break;
                }
            }
        }
    })
}
