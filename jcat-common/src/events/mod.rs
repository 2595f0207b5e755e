//! Catalog events and the event bus
//!
//! Writers (the catalog CRUD layer) emit an event after each successful
//! primary write. The synchronizer and the order manager subscribe and react
//! independently; a failing subscriber never reaches the writer.

use crate::db::models::PropertyMap;
use crate::ids::EntityType;
use crate::schema::RelationshipType;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

/// Kind of relationship mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Create,
    Delete,
}

impl fmt::Display for ChangeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeOp::Create => f.write_str("create"),
            ChangeOp::Delete => f.write_str("delete"),
        }
    }
}

/// Catalog event types
///
/// Broadcast via [`EventBus`]; serializable for logging and replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CatalogEvent {
    /// A relationship was created or deleted
    ///
    /// Triggers:
    /// - Synchronizer: refresh the denormalized fields it backs
    /// - Order Manager: recompute order (`APPEARS_IN` only)
    RelationshipChanged {
        rel_type: RelationshipType,
        /// Canonical source entity id
        source_id: String,
        /// Canonical target entity id
        target_id: String,
        op: ChangeOp,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Entity fields were written by the CRUD layer
    ///
    /// Triggers:
    /// - Synchronizer: materialize relationships implied by reference fields
    EntityFieldsUpdated {
        entity_type: EntityType,
        entity_id: String,
        /// The fields as written (partial update)
        fields: PropertyMap,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The `timestamp` property of an `APPEARS_IN` edge changed
    ///
    /// Triggers:
    /// - Order Manager: recompute order of the container
    TimestampChanged {
        container_id: String,
        child_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl CatalogEvent {
    pub fn relationship_changed(
        rel_type: RelationshipType,
        source_id: &str,
        target_id: &str,
        op: ChangeOp,
    ) -> Self {
        CatalogEvent::RelationshipChanged {
            rel_type,
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            op,
            timestamp: crate::time::now(),
        }
    }

    pub fn entity_fields_updated(entity_type: EntityType, entity_id: &str, fields: PropertyMap) -> Self {
        CatalogEvent::EntityFieldsUpdated {
            entity_type,
            entity_id: entity_id.to_string(),
            fields,
            timestamp: crate::time::now(),
        }
    }

    pub fn timestamp_changed(container_id: &str, child_id: &str) -> Self {
        CatalogEvent::TimestampChanged {
            container_id: container_id.to_string(),
            child_id: child_id.to_string(),
            timestamp: crate::time::now(),
        }
    }

    /// Event type name, for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            CatalogEvent::RelationshipChanged { .. } => "RelationshipChanged",
            CatalogEvent::EntityFieldsUpdated { .. } => "EntityFieldsUpdated",
            CatalogEvent::TimestampChanged { .. } => "TimestampChanged",
        }
    }
}

/// Central event distribution bus
///
/// Thin wrapper over `tokio::sync::broadcast`. Slow subscribers lag and lose
/// the oldest events rather than blocking emitters.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CatalogEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: CatalogEvent,
    ) -> Result<usize, broadcast::error::SendError<CatalogEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: CatalogEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
