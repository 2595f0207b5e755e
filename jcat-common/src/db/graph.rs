//! SQLite-backed property graph store
//!
//! Every statement goes through [`GraphQuery`]; this module only adds the
//! caller's dynamic parameters, decodes rows and groups statements into
//! transactions.

use crate::db::models::{fields, EntityRecord, PropertyMap, RelationshipRecord};
use crate::db::query::GraphQuery;
use crate::ids::EntityType;
use crate::schema::{RelationshipSpec, RelationshipType};
use crate::{Error, Result};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// What a direction swap would do to an edge, decided from current state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapPlan {
    /// The edge no longer exists
    NotFound,
    /// A canonical endpoint is missing or carries the wrong label
    EndpointMissing,
    /// The canonical counterpart already exists; only the reversed edge goes
    DeleteOnly,
    /// Delete the reversed edge and recreate it canonically
    Recreate,
}

/// Result of an executed direction swap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapOutcome {
    NotFound,
    EndpointMissing,
    /// Reversed edge deleted, counterpart already present
    Deleted,
    /// Reversed edge replaced by a canonical edge with the same properties
    Swapped { new_rel_id: i64 },
}

/// What removing a parallel duplicate would do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedundantPlan {
    NotFound,
    /// No other copy of the edge remains; deleting would lose the relationship
    LastCopy,
    Delete,
}

/// Handle to the catalog graph
///
/// Clones share one writer lock: SQLite admits a single writer, and a
/// deferred transaction that read before another write committed cannot
/// upgrade to a write lock.
#[derive(Debug, Clone)]
pub struct GraphStore {
    pool: SqlitePool,
    writer: Arc<Mutex<()>>,
}

impl GraphStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            writer: Arc::new(Mutex::new(())),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ------------------------------------------------------------------
    // Edge reads
    // ------------------------------------------------------------------

    /// All edges of a type with endpoint labels, in insertion order
    pub async fn edges_of_type(&self, rel_type: RelationshipType) -> Result<Vec<RelationshipRecord>> {
        let rows = GraphQuery::EdgesOfType(rel_type)
            .prepare()
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(edge_from_row).collect()
    }

    /// Edges of a type leaving `start_id`
    pub async fn edges_from(
        &self,
        rel_type: RelationshipType,
        start_id: &str,
    ) -> Result<Vec<RelationshipRecord>> {
        let mut conn = self.pool.acquire().await?;
        edges_from(&mut conn, rel_type, start_id).await
    }

    /// Edges of a type entering `end_id`
    pub async fn edges_into(
        &self,
        rel_type: RelationshipType,
        end_id: &str,
    ) -> Result<Vec<RelationshipRecord>> {
        let rows = GraphQuery::EdgesInto(rel_type)
            .prepare()
            .bind(end_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(edge_from_row).collect()
    }

    pub async fn edge(&self, rel_id: i64) -> Result<Option<RelationshipRecord>> {
        let mut conn = self.pool.acquire().await?;
        edge_by_id(&mut conn, rel_id).await
    }

    /// Whether an edge of `rel_type` runs from `start_id` (labelled `start`)
    /// to `end_id` (labelled `end`)
    pub async fn edge_exists(
        &self,
        rel_type: RelationshipType,
        start: EntityType,
        start_id: &str,
        end: EntityType,
        end_id: &str,
    ) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        edge_exists(&mut conn, rel_type, start, start_id, end, end_id).await
    }

    // ------------------------------------------------------------------
    // Edge writes
    // ------------------------------------------------------------------

    /// Create an edge, returning its id
    pub async fn create_edge(
        &self,
        rel_type: RelationshipType,
        start_id: &str,
        end_id: &str,
        properties: &PropertyMap,
    ) -> Result<i64> {
        let _writer = self.writer.lock().await;
        let mut conn = self.pool.acquire().await?;
        create_edge(&mut conn, rel_type, start_id, end_id, properties).await
    }

    /// Delete one edge; `false` when it was already gone
    pub async fn delete_edge(&self, rel_id: i64) -> Result<bool> {
        let _writer = self.writer.lock().await;
        let result = GraphQuery::DeleteEdgeById
            .prepare()
            .bind(rel_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every edge of a type between an ordered pair
    pub async fn delete_edges_between(
        &self,
        rel_type: RelationshipType,
        start_id: &str,
        end_id: &str,
    ) -> Result<u64> {
        let _writer = self.writer.lock().await;
        let result = GraphQuery::DeleteEdgesBetween(rel_type)
            .prepare()
            .bind(start_id.to_string())
            .bind(end_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Merge `updates` into an edge's property bag; `false` when the edge is gone
    pub async fn merge_edge_properties(&self, rel_id: i64, updates: &PropertyMap) -> Result<bool> {
        let _writer = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;
        let Some(edge) = edge_by_id(&mut tx, rel_id).await? else {
            return Ok(false);
        };

        let mut properties = edge.properties;
        for (key, value) in updates {
            properties.insert(key.clone(), value.clone());
        }
        update_edge_properties(&mut tx, rel_id, &properties).await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Write one property on many edges in a single transaction
    ///
    /// Edges that vanished since the caller read them are skipped; the
    /// returned count covers the edges actually written.
    pub async fn set_edge_property_bulk(&self, key: &str, values: &[(i64, Value)]) -> Result<usize> {
        let _writer = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;
        let mut written = 0;

        for (rel_id, value) in values {
            let Some(edge) = edge_by_id(&mut tx, *rel_id).await? else {
                debug!(edge_id = rel_id, "Edge vanished before bulk property update");
                continue;
            };
            let mut properties = edge.properties;
            properties.insert(key.to_string(), value.clone());
            update_edge_properties(&mut tx, *rel_id, &properties).await?;
            written += 1;
        }

        tx.commit().await?;
        Ok(written)
    }

    /// Assign `order` values to `appears-in` edges in one transaction
    pub async fn set_edge_orders(&self, orders: &[(i64, u32)]) -> Result<usize> {
        let values: Vec<(i64, Value)> = orders
            .iter()
            .map(|(rel_id, order)| (*rel_id, Value::from(*order)))
            .collect();
        self.set_edge_property_bulk(fields::ORDER, &values).await
    }

    // ------------------------------------------------------------------
    // Direction repair
    // ------------------------------------------------------------------

    /// Decide, without writing, what [`GraphStore::swap_edge`] would do
    pub async fn preview_swap(&self, rel_id: i64, spec: &RelationshipSpec) -> Result<SwapPlan> {
        let mut conn = self.pool.acquire().await?;
        Ok(evaluate_swap(&mut conn, rel_id, spec).await?.0)
    }

    /// Replace a reversed edge by its canonical form in one transaction
    ///
    /// The edge's current state is re-read inside the transaction, so a
    /// concurrent delete surfaces as [`SwapOutcome::NotFound`] rather than an
    /// error. Properties are carried over unchanged.
    pub async fn swap_edge(&self, rel_id: i64, spec: &RelationshipSpec) -> Result<SwapOutcome> {
        let _writer = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;
        let (plan, edge) = evaluate_swap(&mut tx, rel_id, spec).await?;

        let outcome = match (plan, edge) {
            (SwapPlan::NotFound, _) | (_, None) => SwapOutcome::NotFound,
            (SwapPlan::EndpointMissing, _) => SwapOutcome::EndpointMissing,
            (SwapPlan::DeleteOnly, Some(_)) => {
                delete_edge_by_id(&mut tx, rel_id).await?;
                SwapOutcome::Deleted
            }
            (SwapPlan::Recreate, Some(edge)) => {
                delete_edge_by_id(&mut tx, rel_id).await?;
                // Stored reversed: canonical source is the stored end
                let new_rel_id = create_edge(
                    &mut tx,
                    spec.rel_type,
                    &edge.end_id,
                    &edge.start_id,
                    &edge.properties,
                )
                .await?;
                SwapOutcome::Swapped { new_rel_id }
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    /// Decide, without writing, whether a parallel duplicate can be removed
    pub async fn preview_remove_redundant(&self, rel_id: i64) -> Result<RedundantPlan> {
        let mut conn = self.pool.acquire().await?;
        evaluate_redundant(&mut conn, rel_id).await
    }

    /// Remove one copy of a parallel duplicate, keeping at least one copy
    pub async fn remove_redundant(&self, rel_id: i64) -> Result<RedundantPlan> {
        let _writer = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;
        let plan = evaluate_redundant(&mut tx, rel_id).await?;
        if plan == RedundantPlan::Delete {
            delete_edge_by_id(&mut tx, rel_id).await?;
        }
        tx.commit().await?;
        Ok(plan)
    }

    // ------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------

    pub async fn entity(&self, id: &str) -> Result<Option<EntityRecord>> {
        let row = GraphQuery::EntityById
            .prepare()
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(entity_from_row).transpose()
    }

    /// Entity by id, only if it carries the expected label
    pub async fn entity_with_label(
        &self,
        entity_type: EntityType,
        id: &str,
    ) -> Result<Option<EntityRecord>> {
        let mut conn = self.pool.acquire().await?;
        entity_with_label(&mut conn, entity_type, id).await
    }

    pub async fn entities_with_label(&self, entity_type: EntityType) -> Result<Vec<EntityRecord>> {
        let rows = GraphQuery::EntitiesWithLabel(entity_type)
            .prepare()
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(entity_from_row).collect()
    }

    pub async fn create_entity(
        &self,
        entity_type: EntityType,
        id: &str,
        properties: &PropertyMap,
    ) -> Result<()> {
        let _writer = self.writer.lock().await;
        GraphQuery::CreateEntity(entity_type)
            .prepare()
            .bind(id.to_string())
            .bind(serde_json::to_string(properties)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Merge `updates` into an entity's property bag
    ///
    /// JSON `null` values are stored as null (cleared fields stay visible as
    /// keys). Returns `false` when the entity does not exist.
    pub async fn update_entity_fields(&self, id: &str, updates: &PropertyMap) -> Result<bool> {
        let _writer = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;
        let row = GraphQuery::EntityById
            .prepare()
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        let Some(entity) = row.as_ref().map(entity_from_row).transpose()? else {
            return Ok(false);
        };

        let mut properties = entity.properties;
        for (key, value) in updates {
            properties.insert(key.clone(), value.clone());
        }

        GraphQuery::UpdateEntityProperties
            .prepare()
            .bind(serde_json::to_string(&properties)?)
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }
}

// ----------------------------------------------------------------------
// Connection-level statements, shared by pooled reads and transactions
// ----------------------------------------------------------------------

async fn edges_from(
    conn: &mut SqliteConnection,
    rel_type: RelationshipType,
    start_id: &str,
) -> Result<Vec<RelationshipRecord>> {
    let rows = GraphQuery::EdgesFrom(rel_type)
        .prepare()
        .bind(start_id.to_string())
        .fetch_all(&mut *conn)
        .await?;
    rows.iter().map(edge_from_row).collect()
}

async fn edge_by_id(conn: &mut SqliteConnection, rel_id: i64) -> Result<Option<RelationshipRecord>> {
    let row = GraphQuery::EdgeById
        .prepare()
        .bind(rel_id)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(edge_from_row).transpose()
}

async fn edge_exists(
    conn: &mut SqliteConnection,
    rel_type: RelationshipType,
    start: EntityType,
    start_id: &str,
    end: EntityType,
    end_id: &str,
) -> Result<bool> {
    let row = GraphQuery::EdgeExists {
        rel_type,
        start,
        end,
    }
    .prepare()
    .bind(start_id.to_string())
    .bind(end_id.to_string())
    .fetch_one(&mut *conn)
    .await?;
    let exists: i64 = row.try_get(0)?;
    Ok(exists != 0)
}

async fn entity_with_label(
    conn: &mut SqliteConnection,
    entity_type: EntityType,
    id: &str,
) -> Result<Option<EntityRecord>> {
    let row = GraphQuery::EntityWithLabel(entity_type)
        .prepare()
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(entity_from_row).transpose()
}

async fn create_edge(
    conn: &mut SqliteConnection,
    rel_type: RelationshipType,
    start_id: &str,
    end_id: &str,
    properties: &PropertyMap,
) -> Result<i64> {
    let result = GraphQuery::CreateEdge(rel_type)
        .prepare()
        .bind(start_id.to_string())
        .bind(end_id.to_string())
        .bind(serde_json::to_string(properties)?)
        .execute(&mut *conn)
        .await?;
    Ok(result.last_insert_rowid())
}

async fn delete_edge_by_id(conn: &mut SqliteConnection, rel_id: i64) -> Result<bool> {
    let result = GraphQuery::DeleteEdgeById
        .prepare()
        .bind(rel_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

async fn update_edge_properties(
    conn: &mut SqliteConnection,
    rel_id: i64,
    properties: &PropertyMap,
) -> Result<()> {
    GraphQuery::UpdateEdgeProperties
        .prepare()
        .bind(serde_json::to_string(properties)?)
        .bind(rel_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Decide a swap from the state visible on `conn`
///
/// Used both inside the swap transaction and on a plain connection for dry
/// runs, so both paths classify identically.
async fn evaluate_swap(
    conn: &mut SqliteConnection,
    rel_id: i64,
    spec: &RelationshipSpec,
) -> Result<(SwapPlan, Option<RelationshipRecord>)> {
    let Some(edge) = edge_by_id(conn, rel_id).await? else {
        return Ok((SwapPlan::NotFound, None));
    };
    if edge.rel_type != spec.rel_type {
        return Err(Error::Internal(format!(
            "edge {} is {}, swap requested for {}",
            rel_id, edge.rel_type, spec.rel_type
        )));
    }

    // Canonical source is the stored end, canonical target the stored start
    let source_id = edge.end_id.clone();
    let target_id = edge.start_id.clone();

    if edge_exists(conn, spec.rel_type, spec.source, &source_id, spec.target, &target_id).await? {
        return Ok((SwapPlan::DeleteOnly, Some(edge)));
    }

    let source = entity_with_label(conn, spec.source, &source_id).await?;
    let target = entity_with_label(conn, spec.target, &target_id).await?;
    if source.is_none() || target.is_none() {
        return Ok((SwapPlan::EndpointMissing, Some(edge)));
    }

    Ok((SwapPlan::Recreate, Some(edge)))
}

async fn evaluate_redundant(conn: &mut SqliteConnection, rel_id: i64) -> Result<RedundantPlan> {
    let Some(edge) = edge_by_id(conn, rel_id).await? else {
        return Ok(RedundantPlan::NotFound);
    };

    let siblings = edges_from(conn, edge.rel_type, &edge.start_id).await?;
    let has_other_copy = siblings
        .iter()
        .any(|e| e.rel_id != rel_id && e.end_id == edge.end_id);

    Ok(if has_other_copy {
        RedundantPlan::Delete
    } else {
        RedundantPlan::LastCopy
    })
}

// ----------------------------------------------------------------------
// Row decoding
// ----------------------------------------------------------------------

fn parse_properties(raw: &str) -> Result<PropertyMap> {
    if raw.trim().is_empty() {
        return Ok(PropertyMap::new());
    }
    Ok(serde_json::from_str(raw)?)
}

fn edge_from_row(row: &SqliteRow) -> Result<RelationshipRecord> {
    let rel_type: String = row.try_get("rel_type")?;
    let rel_type = rel_type.parse::<RelationshipType>().map_err(Error::Internal)?;
    let properties: String = row.try_get("properties")?;

    Ok(RelationshipRecord {
        rel_id: row.try_get("rel_id")?,
        rel_type,
        start_id: row.try_get("start_id")?,
        start_label: row.try_get("start_label")?,
        end_id: row.try_get("end_id")?,
        end_label: row.try_get("end_label")?,
        properties: parse_properties(&properties)?,
    })
}

fn entity_from_row(row: &SqliteRow) -> Result<EntityRecord> {
    let properties: String = row.try_get("properties")?;
    Ok(EntityRecord {
        id: row.try_get("id")?,
        label: row.try_get("label")?,
        properties: parse_properties(&properties)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init::open_in_memory;
    use crate::schema::RelationshipSchema;
    use serde_json::json;

    fn props(value: Value) -> PropertyMap {
        value.as_object().cloned().unwrap_or_default()
    }

    async fn seeded_store() -> GraphStore {
        let store = GraphStore::new(open_in_memory().await.unwrap());
        store
            .create_entity(EntityType::Jingle, "j00000001", &props(json!({"title": "Intro"})))
            .await
            .unwrap();
        store
            .create_entity(EntityType::Fabrica, "dQw4w9WgXcQ", &props(json!({"date": "2023-04-01"})))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_edges_carry_endpoint_labels() {
        let store = seeded_store().await;
        store
            .create_edge(RelationshipType::AppearsIn, "j00000001", "dQw4w9WgXcQ", &PropertyMap::new())
            .await
            .unwrap();
        store
            .create_edge(RelationshipType::AppearsIn, "j00000001", "missing0001", &PropertyMap::new())
            .await
            .unwrap();

        let edges = store.edges_of_type(RelationshipType::AppearsIn).await.unwrap();
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].start_label.as_deref(), Some("Jingle"));
        assert_eq!(edges[0].end_label.as_deref(), Some("Fabrica"));
        assert_eq!(edges[1].end_label, None);
        assert!(edges[0].rel_id < edges[1].rel_id);
    }

    #[tokio::test]
    async fn test_edge_exists_requires_labels() {
        let store = seeded_store().await;
        store
            .create_edge(RelationshipType::AppearsIn, "j00000001", "dQw4w9WgXcQ", &PropertyMap::new())
            .await
            .unwrap();

        let t = RelationshipType::AppearsIn;
        assert!(store
            .edge_exists(t, EntityType::Jingle, "j00000001", EntityType::Fabrica, "dQw4w9WgXcQ")
            .await
            .unwrap());
        assert!(!store
            .edge_exists(t, EntityType::Fabrica, "j00000001", EntityType::Jingle, "dQw4w9WgXcQ")
            .await
            .unwrap());
        assert!(!store
            .edge_exists(t, EntityType::Fabrica, "dQw4w9WgXcQ", EntityType::Jingle, "j00000001")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_swap_preserves_properties() {
        let store = seeded_store().await;
        let schema = RelationshipSchema::canonical();
        let spec = schema.canonical_direction(RelationshipType::AppearsIn).unwrap();

        let reversed = store
            .create_edge(
                RelationshipType::AppearsIn,
                "dQw4w9WgXcQ",
                "j00000001",
                &props(json!({"timestamp": "00:05:00", "order": 2})),
            )
            .await
            .unwrap();

        assert_eq!(store.preview_swap(reversed, spec).await.unwrap(), SwapPlan::Recreate);

        let outcome = store.swap_edge(reversed, spec).await.unwrap();
        let SwapOutcome::Swapped { new_rel_id } = outcome else {
            panic!("expected swap, got {:?}", outcome);
        };

        assert!(store.edge(reversed).await.unwrap().is_none());
        let edge = store.edge(new_rel_id).await.unwrap().unwrap();
        assert_eq!(edge.start_id, "j00000001");
        assert_eq!(edge.end_id, "dQw4w9WgXcQ");
        assert_eq!(edge.properties, props(json!({"timestamp": "00:05:00", "order": 2})));
    }

    #[tokio::test]
    async fn test_swap_with_counterpart_only_deletes() {
        let store = seeded_store().await;
        let schema = RelationshipSchema::canonical();
        let spec = schema.canonical_direction(RelationshipType::AppearsIn).unwrap();

        store
            .create_edge(RelationshipType::AppearsIn, "j00000001", "dQw4w9WgXcQ", &PropertyMap::new())
            .await
            .unwrap();
        let reversed = store
            .create_edge(RelationshipType::AppearsIn, "dQw4w9WgXcQ", "j00000001", &PropertyMap::new())
            .await
            .unwrap();

        assert_eq!(store.preview_swap(reversed, spec).await.unwrap(), SwapPlan::DeleteOnly);
        assert_eq!(store.swap_edge(reversed, spec).await.unwrap(), SwapOutcome::Deleted);
        assert_eq!(store.edges_of_type(RelationshipType::AppearsIn).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_swap_missing_edge_and_endpoint() {
        let store = seeded_store().await;
        let schema = RelationshipSchema::canonical();
        let spec = schema.canonical_direction(RelationshipType::AppearsIn).unwrap();

        assert_eq!(store.swap_edge(999, spec).await.unwrap(), SwapOutcome::NotFound);

        let dangling = store
            .create_edge(RelationshipType::AppearsIn, "gone0000001", "j00000001", &PropertyMap::new())
            .await
            .unwrap();
        assert_eq!(store.swap_edge(dangling, spec).await.unwrap(), SwapOutcome::EndpointMissing);
        assert!(store.edge(dangling).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_remove_redundant_keeps_last_copy() {
        let store = seeded_store().await;
        let first = store
            .create_edge(RelationshipType::AppearsIn, "j00000001", "dQw4w9WgXcQ", &PropertyMap::new())
            .await
            .unwrap();
        let second = store
            .create_edge(RelationshipType::AppearsIn, "j00000001", "dQw4w9WgXcQ", &PropertyMap::new())
            .await
            .unwrap();

        assert_eq!(store.remove_redundant(second).await.unwrap(), RedundantPlan::Delete);
        assert_eq!(store.remove_redundant(first).await.unwrap(), RedundantPlan::LastCopy);
        assert_eq!(store.remove_redundant(second).await.unwrap(), RedundantPlan::NotFound);
    }

    #[tokio::test]
    async fn test_update_entity_fields_merges() {
        let store = seeded_store().await;
        let updated = store
            .update_entity_fields("j00000001", &props(json!({"fabricaId": "dQw4w9WgXcQ"})))
            .await
            .unwrap();
        assert!(updated);

        let jingle = store.entity("j00000001").await.unwrap().unwrap();
        assert_eq!(jingle.str_property("title"), Some("Intro"));
        assert_eq!(jingle.str_property("fabricaId"), Some("dQw4w9WgXcQ"));

        assert!(!store
            .update_entity_fields("j99999999", &props(json!({"x": 1})))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_set_edge_orders_skips_vanished_edges() {
        let store = seeded_store().await;
        let rel = store
            .create_edge(RelationshipType::AppearsIn, "j00000001", "dQw4w9WgXcQ", &props(json!({"timestamp": "00:01:00"})))
            .await
            .unwrap();

        let written = store.set_edge_orders(&[(rel, 1), (rel + 100, 2)]).await.unwrap();
        assert_eq!(written, 1);

        let edge = store.edge(rel).await.unwrap().unwrap();
        assert_eq!(edge.properties.get("order"), Some(&json!(1)));
        assert_eq!(edge.properties.get("timestamp"), Some(&json!("00:01:00")));
    }
}
