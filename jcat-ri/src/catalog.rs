//! Catalog write facade
//!
//! Stand-in for the CRUD layer: performs the primary write, then emits the
//! matching [`CatalogEvent`]. Subscribers (synchronizer, order manager) react
//! on their own; a failing subscriber cannot fail the write.

use crate::order::OrderManager;
use crate::sync::Synchronizer;
use jcat_common::config::IntegrityConfig;
use jcat_common::db::{fields, GraphStore, PropertyMap};
use jcat_common::events::{CatalogEvent, ChangeOp, EventBus};
use jcat_common::ids::{self, EntityType};
use jcat_common::{Error, RelationshipSchema, RelationshipType, Result};
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Reference fields that imply relationships
const REFERENCE_FIELDS: [&str; 3] = [fields::FABRICA_ID, fields::CANCION_ID, fields::AUTOR_IDS];

#[derive(Debug, Clone)]
pub struct Catalog {
    store: GraphStore,
    schema: Arc<RelationshipSchema>,
    bus: EventBus,
}

impl Catalog {
    pub fn new(store: GraphStore, schema: Arc<RelationshipSchema>, bus: EventBus) -> Self {
        Self { store, schema, bus }
    }

    /// Catalog with its own bus sized from `[integrity] event_capacity`
    pub fn with_config(store: GraphStore, schema: Arc<RelationshipSchema>, config: &IntegrityConfig) -> Self {
        Self::new(store, schema, EventBus::new(config.event_capacity.max(1)))
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    /// Start the synchronizer and order manager as bus subscribers
    pub fn spawn_subscribers(&self) -> Vec<JoinHandle<()>> {
        let synchronizer = Arc::new(
            Synchronizer::new(self.store.clone(), self.schema.clone()).with_event_bus(self.bus.clone()),
        );
        let order_manager = Arc::new(OrderManager::new(self.store.clone()));
        vec![
            synchronizer.spawn_listener(&self.bus),
            order_manager.spawn_listener(&self.bus),
        ]
    }

    /// Create an entity with a fresh id
    pub async fn create_entity(&self, entity_type: EntityType, properties: PropertyMap) -> Result<String> {
        let id = ids::generate(entity_type)?;
        self.create_entity_with_id(entity_type, &id, properties).await?;
        Ok(id)
    }

    /// Create an entity with a caller-supplied id (fabricas carry external ids)
    pub async fn create_entity_with_id(
        &self,
        entity_type: EntityType,
        id: &str,
        properties: PropertyMap,
    ) -> Result<()> {
        let classified = ids::entity_type_of(id)?;
        if classified != entity_type {
            return Err(Error::InvalidInput(format!(
                "id {} is a {} id, not {}",
                id, classified, entity_type
            )));
        }

        self.store.create_entity(entity_type, id, &properties).await?;
        info!(entity_type = %entity_type, id, "Created entity");

        let references = reference_fields(&properties);
        if !references.is_empty() {
            self.bus
                .emit_lossy(CatalogEvent::entity_fields_updated(entity_type, id, references));
        }
        Ok(())
    }

    /// Create a relationship in canonical direction
    ///
    /// Both endpoints must exist with their canonical labels.
    pub async fn create_relationship(
        &self,
        rel_type: RelationshipType,
        source_id: &str,
        target_id: &str,
        properties: PropertyMap,
    ) -> Result<i64> {
        let spec = self
            .schema
            .canonical_direction(rel_type)
            .copied()
            .ok_or_else(|| Error::InvalidInput(format!("unregistered relationship type {}", rel_type)))?;

        for (entity_type, id) in [(spec.source, source_id), (spec.target, target_id)] {
            if self.store.entity_with_label(entity_type, id).await?.is_none() {
                return Err(Error::NotFound(format!("{} {}", entity_type, id)));
            }
        }

        let rel_id = self.store.create_edge(rel_type, source_id, target_id, &properties).await?;
        info!(rel_type = %rel_type, source_id, target_id, edge_id = rel_id, "Created relationship");

        self.bus.emit_lossy(CatalogEvent::relationship_changed(
            rel_type,
            source_id,
            target_id,
            ChangeOp::Create,
        ));
        Ok(rel_id)
    }

    /// Delete every `rel_type` edge from `source_id` to `target_id`
    pub async fn delete_relationship(
        &self,
        rel_type: RelationshipType,
        source_id: &str,
        target_id: &str,
    ) -> Result<u64> {
        let deleted = self.store.delete_edges_between(rel_type, source_id, target_id).await?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("{} {} -> {}", rel_type, source_id, target_id)));
        }

        info!(rel_type = %rel_type, source_id, target_id, deleted, "Deleted relationship");
        self.bus.emit_lossy(CatalogEvent::relationship_changed(
            rel_type,
            source_id,
            target_id,
            ChangeOp::Delete,
        ));
        Ok(deleted)
    }

    /// Partial field update on an entity
    pub async fn update_entity_fields(
        &self,
        entity_type: EntityType,
        id: &str,
        updates: PropertyMap,
    ) -> Result<()> {
        if self.store.entity_with_label(entity_type, id).await?.is_none() {
            return Err(Error::NotFound(format!("{} {}", entity_type, id)));
        }
        self.store.update_entity_fields(id, &updates).await?;
        self.bus
            .emit_lossy(CatalogEvent::entity_fields_updated(entity_type, id, updates));
        Ok(())
    }

    /// Change where a jingle sits inside a fabrica
    pub async fn update_appearance_timestamp(
        &self,
        jingle_id: &str,
        fabrica_id: &str,
        timestamp: Value,
    ) -> Result<()> {
        let edges = self.store.edges_from(RelationshipType::AppearsIn, jingle_id).await?;
        let mut updates = PropertyMap::new();
        updates.insert(fields::TIMESTAMP.to_string(), timestamp);

        let mut updated = 0;
        for edge in edges.iter().filter(|e| e.end_id == fabrica_id) {
            if self.store.merge_edge_properties(edge.rel_id, &updates).await? {
                updated += 1;
            }
        }
        if updated == 0 {
            return Err(Error::NotFound(format!(
                "{} {} -> {}",
                RelationshipType::AppearsIn,
                jingle_id,
                fabrica_id
            )));
        }

        self.bus
            .emit_lossy(CatalogEvent::timestamp_changed(fabrica_id, jingle_id));
        Ok(())
    }
}

fn reference_fields(properties: &PropertyMap) -> PropertyMap {
    properties
        .iter()
        .filter(|(key, value)| REFERENCE_FIELDS.contains(&key.as_str()) && !value.is_null())
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
