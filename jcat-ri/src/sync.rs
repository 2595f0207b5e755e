//! Redundant property synchronization
//!
//! Denormalized fields mirror relationship state:
//!
//! | Field                          | Mirrors            | Multiplicity policy                  |
//! |--------------------------------|--------------------|--------------------------------------|
//! | Jingle `fabricaId`/`fabricaDate` | `APPEARS_IN`     | most recent fabrica by date          |
//! | Jingle `cancionId`             | `VERSIONA`         | first remaining edge by insertion    |
//! | Cancion `autorIds`             | `AUTOR_DE` (into)  | sorted set of all author ids         |
//!
//! Everything here is best effort: failures end up in the returned
//! [`SyncReport`] and the log, never in an `Err`.

use jcat_common::db::{fields, EntityRecord, GraphStore, PropertyMap, RelationshipRecord};
use jcat_common::events::{CatalogEvent, ChangeOp, EventBus};
use jcat_common::time::parse_date_value;
use jcat_common::{EntityType, RelationshipSchema, RelationshipType, Result};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Relationship created to satisfy a reference field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedRelationship {
    pub rel_type: RelationshipType,
    pub source_id: String,
    pub target_id: String,
    pub rel_id: i64,
}

/// What one synchronization call did
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    /// Entity ids whose fields were rewritten
    pub updated_entities: Vec<String>,
    pub created_relationships: Vec<CreatedRelationship>,
    pub errors: Vec<String>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    fn merge(&mut self, other: SyncReport) {
        self.updated_entities.extend(other.updated_entities);
        self.created_relationships.extend(other.created_relationships);
        self.errors.extend(other.errors);
    }

    fn record<T>(&mut self, result: Result<T>, context: &str) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                error!("{}: {}", context, e);
                self.errors.push(format!("{}: {}", context, e));
                None
            }
        }
    }
}

/// Keeps denormalized fields consistent with relationships
#[derive(Debug, Clone)]
pub struct Synchronizer {
    store: GraphStore,
    schema: Arc<RelationshipSchema>,
    bus: Option<EventBus>,
}

impl Synchronizer {
    pub fn new(store: GraphStore, schema: Arc<RelationshipSchema>) -> Self {
        Self {
            store,
            schema,
            bus: None,
        }
    }

    /// Announce relationships created by [`Synchronizer::sync_entity_fields`]
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Refresh the fields backed by a relationship after it was created or
    /// deleted. `source_id`/`target_id` are in canonical direction.
    pub async fn on_relationship_change(
        &self,
        rel_type: RelationshipType,
        source_id: &str,
        target_id: &str,
        op: ChangeOp,
    ) -> SyncReport {
        match (rel_type, op) {
            (RelationshipType::AppearsIn, ChangeOp::Create) => {
                let mut report = SyncReport::default();
                let date = self.fabrica_date(target_id, &mut report).await;
                self.write_fields(source_id, &fabrica_fields(Some(target_id), date), &mut report)
                    .await;
                report
            }
            (RelationshipType::VersionOf, ChangeOp::Create) => {
                let mut report = SyncReport::default();
                self.write_fields(
                    source_id,
                    &single_field(fields::CANCION_ID, json!(target_id)),
                    &mut report,
                )
                .await;
                report
            }
            (RelationshipType::AppearsIn, ChangeOp::Delete)
            | (RelationshipType::VersionOf, ChangeOp::Delete) => {
                self.refresh_fields(rel_type, source_id).await
            }
            (RelationshipType::AuthoredBy, _) => self.refresh_fields(rel_type, target_id).await,
            _ => SyncReport::default(),
        }
    }

    /// Recompute the fields `rel_type` backs on `entity_id` from the edges
    /// that currently exist, applying the multiplicity policy
    pub async fn refresh_fields(&self, rel_type: RelationshipType, entity_id: &str) -> SyncReport {
        let mut report = SyncReport::default();

        let result = self.expected_fields(rel_type, entity_id).await;
        let context = format!("Failed to derive {} fields for {}", rel_type, entity_id);
        if let Some(Some(updates)) = report.record(result, &context) {
            self.write_fields(entity_id, &updates, &mut report).await;
            debug!(rel_type = %rel_type, entity_id, "Synchronized denormalized fields");
        }

        report
    }

    /// Field values `rel_type` implies for `entity_id`, or `None` when the
    /// type backs no denormalized field
    pub async fn expected_fields(
        &self,
        rel_type: RelationshipType,
        entity_id: &str,
    ) -> Result<Option<PropertyMap>> {
        let derived = match rel_type {
            RelationshipType::AppearsIn => match self.select_fabrica(entity_id).await? {
                Some((fabrica_id, date)) => fabrica_fields(Some(fabrica_id.as_str()), date),
                None => fabrica_fields(None, Value::Null),
            },
            RelationshipType::VersionOf => {
                let edges = self.store.edges_from(RelationshipType::VersionOf, entity_id).await?;
                let first = edges.first().map(|e| json!(e.end_id)).unwrap_or(Value::Null);
                single_field(fields::CANCION_ID, first)
            }
            RelationshipType::AuthoredBy => {
                let edges = self.store.edges_into(RelationshipType::AuthoredBy, entity_id).await?;
                let ids: Vec<String> = edges
                    .into_iter()
                    .map(|e| e.start_id)
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect();
                single_field(fields::AUTOR_IDS, json!(ids))
            }
            _ => return Ok(None),
        };
        Ok(Some(derived))
    }

    /// Materialize relationships implied by reference fields just written on
    /// an entity
    ///
    /// A reference to an entity that does not exist is logged as an error;
    /// the field itself stays as written.
    pub async fn sync_entity_fields(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        written: &PropertyMap,
    ) -> SyncReport {
        let mut report = SyncReport::default();

        match entity_type {
            EntityType::Jingle => {
                if let Some(fabrica_id) = non_empty_str(written.get(fields::FABRICA_ID)) {
                    let created = self
                        .ensure_relationship(RelationshipType::AppearsIn, entity_id, fabrica_id, &mut report)
                        .await;
                    if created {
                        // fabricaDate follows the fabrica that was just linked
                        let date = self.fabrica_date(fabrica_id, &mut report).await;
                        self.write_fields(entity_id, &single_field(fields::FABRICA_DATE, date), &mut report)
                            .await;
                    }
                }
                if let Some(cancion_id) = non_empty_str(written.get(fields::CANCION_ID)) {
                    self.ensure_relationship(RelationshipType::VersionOf, entity_id, cancion_id, &mut report)
                        .await;
                }
            }
            EntityType::Cancion => {
                if let Some(Value::Array(ids)) = written.get(fields::AUTOR_IDS) {
                    for artista_id in ids.iter().filter_map(|v| non_empty_str(Some(v))) {
                        self.ensure_relationship(
                            RelationshipType::AuthoredBy,
                            artista_id,
                            entity_id,
                            &mut report,
                        )
                        .await;
                    }
                }
            }
            EntityType::Fabrica => {
                if written.contains_key(fields::DATE) {
                    report.merge(self.refresh_appearing_jingles(entity_id).await);
                }
            }
            _ => {}
        }

        report
    }

    /// Re-derive `fabricaId`/`fabricaDate` on every jingle appearing in a
    /// fabrica whose date changed
    async fn refresh_appearing_jingles(&self, fabrica_id: &str) -> SyncReport {
        let mut report = SyncReport::default();
        let result = self.store.edges_into(RelationshipType::AppearsIn, fabrica_id).await;
        let Some(edges) = report.record(result, &format!("Failed to read appearances in {}", fabrica_id))
        else {
            return report;
        };

        let jingles: BTreeSet<String> = edges.into_iter().map(|e| e.start_id).collect();
        for jingle_id in &jingles {
            report.merge(self.refresh_fields(RelationshipType::AppearsIn, jingle_id).await);
        }
        debug!(fabrica_id, jingles = jingles.len(), "Propagated fabrica date");
        report
    }

    /// Recompute every denormalized field of one entity from its edges
    pub async fn resync_entity(&self, entity: &EntityRecord) -> SyncReport {
        let backing: &[RelationshipType] = match entity.entity_type() {
            Some(EntityType::Jingle) => &[RelationshipType::AppearsIn, RelationshipType::VersionOf],
            Some(EntityType::Cancion) => &[RelationshipType::AuthoredBy],
            _ => &[],
        };

        let mut report = SyncReport::default();
        for rel_type in backing {
            report.merge(self.refresh_fields(*rel_type, &entity.id).await);
        }
        report
    }

    /// React to a catalog event
    pub async fn handle_event(&self, event: &CatalogEvent) -> SyncReport {
        match event {
            CatalogEvent::RelationshipChanged {
                rel_type,
                source_id,
                target_id,
                op,
                ..
            } => self.on_relationship_change(*rel_type, source_id, target_id, *op).await,
            CatalogEvent::EntityFieldsUpdated {
                entity_type,
                entity_id,
                fields,
                ..
            } => self.sync_entity_fields(*entity_type, entity_id, fields).await,
            CatalogEvent::TimestampChanged { .. } => SyncReport::default(),
        }
    }

    /// Subscribe to the bus and synchronize in the background
    pub fn spawn_listener(self: Arc<Self>, bus: &EventBus) -> JoinHandle<()> {
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            info!("Synchronizer listening for catalog events");
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let report = self.handle_event(&event).await;
                        if !report.is_clean() {
                            warn!(
                                event = event.event_type(),
                                errors = report.errors.len(),
                                "Synchronization finished with errors"
                            );
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Synchronizer lagged {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Synchronizer listener stopped");
        })
    }

    // ------------------------------------------------------------------

    /// Fabrica with the most recent date among the jingle's remaining
    /// `APPEARS_IN` edges. Missing or unparseable dates rank oldest; ties go
    /// to the first edge listed.
    async fn select_fabrica(&self, jingle_id: &str) -> Result<Option<(String, Value)>> {
        let edges = self.store.edges_from(RelationshipType::AppearsIn, jingle_id).await?;

        let mut best: Option<(&RelationshipRecord, Value)> = None;
        for edge in &edges {
            let date = self
                .store
                .entity_with_label(EntityType::Fabrica, &edge.end_id)
                .await?
                .and_then(|f| f.property(fields::DATE).cloned())
                .unwrap_or(Value::Null);

            let newer = match &best {
                None => true,
                Some((_, best_date)) => parse_date_value(&date) > parse_date_value(best_date),
            };
            if newer {
                best = Some((edge, date));
            }
        }

        Ok(best.map(|(edge, date)| (edge.end_id.clone(), date)))
    }

    async fn fabrica_date(&self, fabrica_id: &str, report: &mut SyncReport) -> Value {
        let result = self.store.entity_with_label(EntityType::Fabrica, fabrica_id).await;
        match report.record(result, &format!("Failed to read fabrica {}", fabrica_id)) {
            Some(Some(fabrica)) => fabrica.property(fields::DATE).cloned().unwrap_or(Value::Null),
            Some(None) => {
                warn!(fabrica_id, "Fabrica not found; clearing fabricaDate");
                Value::Null
            }
            None => Value::Null,
        }
    }

    async fn write_fields(&self, entity_id: &str, updates: &PropertyMap, report: &mut SyncReport) {
        let result = self.store.update_entity_fields(entity_id, updates).await;
        match report.record(result, &format!("Failed to update fields of {}", entity_id)) {
            Some(true) => report.updated_entities.push(entity_id.to_string()),
            Some(false) => {
                error!(entity_id, "Entity not found while synchronizing fields");
                report
                    .errors
                    .push(format!("entity {} not found", entity_id));
            }
            None => {}
        }
    }

    /// Create `source -[rel_type]-> target` unless it exists; returns whether
    /// an edge was created
    async fn ensure_relationship(
        &self,
        rel_type: RelationshipType,
        source_id: &str,
        target_id: &str,
        report: &mut SyncReport,
    ) -> bool {
        let result = self.store.edges_from(rel_type, source_id).await;
        let Some(edges) = report.record(result, &format!("Failed to read {} of {}", rel_type, source_id))
        else {
            return false;
        };
        if edges.iter().any(|e| e.end_id == target_id) {
            return false;
        }

        let Some(spec) = self.schema.canonical_direction(rel_type).copied() else {
            return false;
        };

        let source = self.store.entity_with_label(spec.source, source_id).await;
        let target = self.store.entity_with_label(spec.target, target_id).await;
        let context = format!("Failed to look up endpoints of {} {} -> {}", rel_type, source_id, target_id);
        let (Some(source), Some(target)) = (
            report.record(source, &context),
            report.record(target, &context),
        ) else {
            return false;
        };

        if source.is_none() || target.is_none() {
            let missing = if source.is_none() { source_id } else { target_id };
            error!(
                rel_type = %rel_type,
                source_id,
                target_id,
                "Referenced entity {} not found; relationship not created", missing
            );
            report.errors.push(format!(
                "{} {} -> {}: referenced entity {} not found",
                rel_type, source_id, target_id, missing
            ));
            return false;
        }

        let result = self
            .store
            .create_edge(rel_type, source_id, target_id, &PropertyMap::new())
            .await;
        let Some(rel_id) = report.record(result, &format!("Failed to create {} {} -> {}", rel_type, source_id, target_id))
        else {
            return false;
        };

        info!(
            rel_type = %rel_type,
            source_id,
            target_id,
            edge_id = rel_id,
            "Created relationship implied by reference field"
        );
        report.created_relationships.push(CreatedRelationship {
            rel_type,
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            rel_id,
        });

        if let Some(bus) = &self.bus {
            bus.emit_lossy(CatalogEvent::relationship_changed(
                rel_type,
                source_id,
                target_id,
                ChangeOp::Create,
            ));
        }
        true
    }
}

fn fabrica_fields(fabrica_id: Option<&str>, date: Value) -> PropertyMap {
    let mut map = PropertyMap::new();
    map.insert(
        fields::FABRICA_ID.to_string(),
        fabrica_id.map(|id| json!(id)).unwrap_or(Value::Null),
    );
    map.insert(fields::FABRICA_DATE.to_string(), date);
    map
}

fn single_field(key: &str, value: Value) -> PropertyMap {
    let mut map = PropertyMap::new();
    map.insert(key.to_string(), value);
    map
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jcat_common::db::init::open_in_memory;

    fn props(value: Value) -> PropertyMap {
        value.as_object().cloned().unwrap_or_default()
    }

    async fn store() -> GraphStore {
        let store = GraphStore::new(open_in_memory().await.unwrap());
        for (t, id, p) in [
            (EntityType::Jingle, "j00000001", json!({})),
            (EntityType::Fabrica, "fab-2022-01", json!({"date": "2022-01-15"})),
            (EntityType::Fabrica, "fab-2023-04", json!({"date": "2023-04-01T20:00:00Z"})),
            (EntityType::Fabrica, "fab-nodate1", json!({})),
            (EntityType::Cancion, "c00000001", json!({})),
            (EntityType::Cancion, "c00000002", json!({})),
            (EntityType::Artista, "a00000001", json!({})),
            (EntityType::Artista, "a00000002", json!({})),
        ] {
            store.create_entity(t, id, &props(p)).await.unwrap();
        }
        store
    }

    async fn field(store: &GraphStore, id: &str, key: &str) -> Value {
        store
            .entity(id)
            .await
            .unwrap()
            .unwrap()
            .properties
            .get(key)
            .cloned()
            .unwrap_or(Value::Null)
    }

    #[tokio::test]
    async fn test_author_ids_converge() {
        let store = store().await;
        let sync = Synchronizer::new(store.clone(), Arc::new(RelationshipSchema::canonical()));
        let t = RelationshipType::AuthoredBy;

        store.create_edge(t, "a00000001", "c00000001", &PropertyMap::new()).await.unwrap();
        sync.on_relationship_change(t, "a00000001", "c00000001", ChangeOp::Create).await;
        store.create_edge(t, "a00000002", "c00000001", &PropertyMap::new()).await.unwrap();
        sync.on_relationship_change(t, "a00000002", "c00000001", ChangeOp::Create).await;
        assert_eq!(field(&store, "c00000001", "autorIds").await, json!(["a00000001", "a00000002"]));

        store.delete_edges_between(t, "a00000001", "c00000001").await.unwrap();
        let report = sync.on_relationship_change(t, "a00000001", "c00000001", ChangeOp::Delete).await;
        assert!(report.is_clean());
        assert_eq!(field(&store, "c00000001", "autorIds").await, json!(["a00000002"]));
    }

    #[tokio::test]
    async fn test_appears_in_delete_picks_most_recent_fabrica() {
        let store = store().await;
        let sync = Synchronizer::new(store.clone(), Arc::new(RelationshipSchema::canonical()));
        let t = RelationshipType::AppearsIn;

        for fabrica in ["fab-nodate1", "fab-2023-04", "fab-2022-01"] {
            store.create_edge(t, "j00000001", fabrica, &PropertyMap::new()).await.unwrap();
            sync.on_relationship_change(t, "j00000001", fabrica, ChangeOp::Create).await;
        }
        assert_eq!(field(&store, "j00000001", "fabricaId").await, json!("fab-2022-01"));

        store.delete_edges_between(t, "j00000001", "fab-2022-01").await.unwrap();
        sync.on_relationship_change(t, "j00000001", "fab-2022-01", ChangeOp::Delete).await;
        assert_eq!(field(&store, "j00000001", "fabricaId").await, json!("fab-2023-04"));
        assert_eq!(field(&store, "j00000001", "fabricaDate").await, json!("2023-04-01T20:00:00Z"));

        store.delete_edges_between(t, "j00000001", "fab-2023-04").await.unwrap();
        sync.on_relationship_change(t, "j00000001", "fab-2023-04", ChangeOp::Delete).await;
        assert_eq!(field(&store, "j00000001", "fabricaId").await, json!("fab-nodate1"));
        assert_eq!(field(&store, "j00000001", "fabricaDate").await, Value::Null);

        store.delete_edges_between(t, "j00000001", "fab-nodate1").await.unwrap();
        sync.on_relationship_change(t, "j00000001", "fab-nodate1", ChangeOp::Delete).await;
        assert_eq!(field(&store, "j00000001", "fabricaId").await, Value::Null);
    }

    #[tokio::test]
    async fn test_version_delete_picks_first_remaining() {
        let store = store().await;
        let sync = Synchronizer::new(store.clone(), Arc::new(RelationshipSchema::canonical()));
        let t = RelationshipType::VersionOf;

        store.create_edge(t, "j00000001", "c00000002", &PropertyMap::new()).await.unwrap();
        store.create_edge(t, "j00000001", "c00000001", &PropertyMap::new()).await.unwrap();
        sync.on_relationship_change(t, "j00000001", "c00000001", ChangeOp::Create).await;
        assert_eq!(field(&store, "j00000001", "cancionId").await, json!("c00000001"));

        store.delete_edges_between(t, "j00000001", "c00000001").await.unwrap();
        sync.on_relationship_change(t, "j00000001", "c00000001", ChangeOp::Delete).await;
        assert_eq!(field(&store, "j00000001", "cancionId").await, json!("c00000002"));
    }

    #[tokio::test]
    async fn test_reference_field_materializes_relationship() {
        let store = store().await;
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let sync = Synchronizer::new(store.clone(), Arc::new(RelationshipSchema::canonical())).with_event_bus(bus);

        let written = props(json!({"fabricaId": "fab-2023-04", "cancionId": "c99999999"}));
        store.update_entity_fields("j00000001", &written).await.unwrap();
        let report = sync.sync_entity_fields(EntityType::Jingle, "j00000001", &written).await;

        assert_eq!(report.created_relationships.len(), 1);
        assert_eq!(report.created_relationships[0].rel_type, RelationshipType::AppearsIn);
        assert_eq!(report.errors.len(), 1, "missing cancion is reported");
        assert!(store
            .edge_exists(
                RelationshipType::AppearsIn,
                EntityType::Jingle,
                "j00000001",
                EntityType::Fabrica,
                "fab-2023-04"
            )
            .await
            .unwrap());
        // The field write is kept even though its relationship could not be created
        assert_eq!(field(&store, "j00000001", "cancionId").await, json!("c99999999"));
        assert_eq!(field(&store, "j00000001", "fabricaDate").await, json!("2023-04-01T20:00:00Z"));

        match rx.recv().await.unwrap() {
            CatalogEvent::RelationshipChanged { rel_type, op, .. } => {
                assert_eq!(rel_type, RelationshipType::AppearsIn);
                assert_eq!(op, ChangeOp::Create);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_author_ids_field_materializes_edges() {
        let store = store().await;
        let sync = Synchronizer::new(store.clone(), Arc::new(RelationshipSchema::canonical()));

        let written = props(json!({"autorIds": ["a00000002", "a00000001"]}));
        let report = sync.sync_entity_fields(EntityType::Cancion, "c00000002", &written).await;
        assert_eq!(report.created_relationships.len(), 2);
        assert!(report.is_clean());

        // Already present: nothing new
        let again = sync.sync_entity_fields(EntityType::Cancion, "c00000002", &written).await;
        assert!(again.created_relationships.is_empty());
    }

    #[tokio::test]
    async fn test_fabrica_date_change_reaches_jingles() {
        let store = store().await;
        let sync = Synchronizer::new(store.clone(), Arc::new(RelationshipSchema::canonical()));
        let t = RelationshipType::AppearsIn;
        store.create_edge(t, "j00000001", "fab-2022-01", &PropertyMap::new()).await.unwrap();
        sync.on_relationship_change(t, "j00000001", "fab-2022-01", ChangeOp::Create).await;
        assert_eq!(field(&store, "j00000001", "fabricaDate").await, json!("2022-01-15"));

        let written = props(json!({"date": "2024-09-09"}));
        store.update_entity_fields("fab-2022-01", &written).await.unwrap();
        let report = sync.sync_entity_fields(EntityType::Fabrica, "fab-2022-01", &written).await;

        assert!(report.is_clean());
        assert_eq!(report.updated_entities, vec!["j00000001".to_string()]);
        assert_eq!(field(&store, "j00000001", "fabricaId").await, json!("fab-2022-01"));
        assert_eq!(field(&store, "j00000001", "fabricaDate").await, json!("2024-09-09"));

        // Fields other than the date leave jingles alone
        let renamed = props(json!({"title": "Especial"}));
        let report = sync.sync_entity_fields(EntityType::Fabrica, "fab-2022-01", &renamed).await;
        assert!(report.updated_entities.is_empty());
    }

    #[tokio::test]
    async fn test_missing_entity_never_errors_out() {
        let store = store().await;
        let sync = Synchronizer::new(store.clone(), Arc::new(RelationshipSchema::canonical()));
        let report = sync
            .on_relationship_change(RelationshipType::VersionOf, "j99999999", "c00000001", ChangeOp::Create)
            .await;
        assert!(!report.is_clean());
        assert!(report.updated_entities.is_empty());
    }
}
