use super::{CleanupContext, CleanupScript, ScriptCategory, ScriptMode, ScriptReport};
use async_trait::async_trait;
use jcat_common::db::{fields, EntityRecord};
use jcat_common::{EntityType, RelationshipType, Result};
use serde_json::Value;

/// Which denormalized field family to check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftKind {
    /// Jingle `fabricaId`/`fabricaDate` against `APPEARS_IN` and the fabrica date
    JingleFabrica,
    /// Jingle `cancionId` against `VERSIONA`
    JingleCancion,
    /// Cancion `autorIds` against `AUTOR_DE`
    CancionAutor,
}

impl DriftKind {
    fn entity_type(self) -> EntityType {
        match self {
            DriftKind::JingleFabrica | DriftKind::JingleCancion => EntityType::Jingle,
            DriftKind::CancionAutor => EntityType::Cancion,
        }
    }

    fn rel_type(self) -> RelationshipType {
        match self {
            DriftKind::JingleFabrica => RelationshipType::AppearsIn,
            DriftKind::JingleCancion => RelationshipType::VersionOf,
            DriftKind::CancionAutor => RelationshipType::AuthoredBy,
        }
    }
}

/// Denormalized fields that disagree with the relationships they mirror
///
/// Relationships are authoritative: fix mode rewrites the fields.
pub struct FieldDriftScript {
    kind: DriftKind,
}

impl FieldDriftScript {
    pub fn new(kind: DriftKind) -> Self {
        Self { kind }
    }

    /// Single-valued reference: must name one of the current targets, and
    /// be null exactly when there are none
    async fn reference_drift(&self, ctx: &CleanupContext, entity: &EntityRecord) -> Result<Option<String>> {
        let key = match self.kind {
            DriftKind::JingleFabrica => fields::FABRICA_ID,
            _ => fields::CANCION_ID,
        };
        let edges = ctx.store.edges_from(self.kind.rel_type(), &entity.id).await?;
        let current = entity.str_property(key);

        let drift = match current {
            None if edges.is_empty() => None,
            None => Some(format!("{} is null but {} edges exist", key, edges.len())),
            Some(id) if edges.is_empty() => Some(format!("{} is {} but no edges exist", key, id)),
            Some(id) if !edges.iter().any(|e| e.end_id == id) => {
                Some(format!("{} is {} which no edge targets", key, id))
            }
            Some(id) if self.kind == DriftKind::JingleFabrica => self.fabrica_date_drift(ctx, entity, id).await?,
            Some(_) => None,
        };
        Ok(drift)
    }

    /// `fabricaDate` must copy the `date` of the fabrica `fabricaId` names
    async fn fabrica_date_drift(
        &self,
        ctx: &CleanupContext,
        jingle: &EntityRecord,
        fabrica_id: &str,
    ) -> Result<Option<String>> {
        let expected = ctx
            .store
            .entity_with_label(EntityType::Fabrica, fabrica_id)
            .await?
            .and_then(|f| f.property(fields::DATE).cloned())
            .unwrap_or(Value::Null);
        let actual = jingle.property(fields::FABRICA_DATE).cloned().unwrap_or(Value::Null);

        if actual == expected {
            Ok(None)
        } else {
            Ok(Some(format!(
                "{} is {} but fabrica {} has date {}",
                fields::FABRICA_DATE,
                actual,
                fabrica_id,
                expected
            )))
        }
    }

    /// Set-valued reference: must equal the sorted set of sources
    async fn set_drift(&self, ctx: &CleanupContext, entity: &EntityRecord) -> Result<Option<String>> {
        let Some(expected) = ctx.synchronizer.expected_fields(self.kind.rel_type(), &entity.id).await? else {
            return Ok(None);
        };

        let drift = expected
            .iter()
            .find(|(key, value)| entity.properties.get(*key).unwrap_or(&Value::Null) != *value)
            .map(|(key, value)| {
                let actual = entity.properties.get(key).unwrap_or(&Value::Null);
                format!("{} is {} but relationships imply {}", key, actual, value)
            });
        Ok(drift)
    }
}

#[async_trait]
impl CleanupScript for FieldDriftScript {
    fn id(&self) -> &str {
        match self.kind {
            DriftKind::JingleFabrica => "jingle-fabrica-drift",
            DriftKind::JingleCancion => "jingle-cancion-drift",
            DriftKind::CancionAutor => "cancion-autor-drift",
        }
    }

    fn description(&self) -> &str {
        match self.kind {
            DriftKind::JingleFabrica => "Jingle fabricaId/fabricaDate out of step with APPEARS_IN",
            DriftKind::JingleCancion => "Jingle cancionId out of step with VERSIONA",
            DriftKind::CancionAutor => "Cancion autorIds out of step with AUTOR_DE",
        }
    }

    fn category(&self) -> ScriptCategory {
        ScriptCategory::Denormalization
    }

    async fn run(&self, ctx: &CleanupContext, mode: ScriptMode) -> Result<ScriptReport> {
        let mut report = ScriptReport::new(self.id(), mode);
        let rel_type = self.kind.rel_type();
        let entities = ctx.store.entities_with_label(self.kind.entity_type()).await?;
        report.examined = entities.len();

        for entity in &entities {
            let found = match self.kind {
                DriftKind::CancionAutor => self.set_drift(ctx, entity).await,
                _ => self.reference_drift(ctx, entity).await,
            };
            let drifted = match found {
                Ok(drifted) => drifted,
                Err(e) => {
                    report.errors.push(format!("{}: {}", entity.id, e));
                    continue;
                }
            };
            let Some(description) = drifted else {
                continue;
            };
            report.issue(&entity.id, description);

            if mode == ScriptMode::Fix {
                let sync = ctx.synchronizer.refresh_fields(rel_type, &entity.id).await;
                if sync.is_clean() {
                    report.fixed += 1;
                } else {
                    report.errors.extend(sync.errors);
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jcat_common::db::init::open_in_memory;
    use jcat_common::db::{GraphStore, PropertyMap};
    use jcat_common::RelationshipSchema;
    use serde_json::json;
    use std::sync::Arc;

    fn props(value: Value) -> PropertyMap {
        value.as_object().cloned().unwrap_or_default()
    }

    async fn context() -> CleanupContext {
        let store = GraphStore::new(open_in_memory().await.unwrap());
        CleanupContext::new(store, Arc::new(RelationshipSchema::canonical()))
    }

    #[tokio::test]
    async fn test_stale_cancion_id_is_rewritten() {
        let ctx = context().await;
        ctx.store
            .create_entity(EntityType::Jingle, "j00000001", &props(json!({"cancionId": "c00000009"})))
            .await
            .unwrap();
        ctx.store.create_entity(EntityType::Cancion, "c00000001", &PropertyMap::new()).await.unwrap();
        ctx.store
            .create_edge(RelationshipType::VersionOf, "j00000001", "c00000001", &PropertyMap::new())
            .await
            .unwrap();

        let script = FieldDriftScript::new(DriftKind::JingleCancion);
        let check = script.run(&ctx, ScriptMode::Check).await.unwrap();
        assert_eq!(check.examined, 1);
        assert_eq!(check.issues.len(), 1);
        assert_eq!(check.issues[0].entity_id, "j00000001");

        let fix = script.run(&ctx, ScriptMode::Fix).await.unwrap();
        assert_eq!(fix.fixed, 1);
        let jingle = ctx.store.entity("j00000001").await.unwrap().unwrap();
        assert_eq!(jingle.str_property("cancionId"), Some("c00000001"));

        assert!(script.run(&ctx, ScriptMode::Check).await.unwrap().issues.is_empty());
    }

    #[tokio::test]
    async fn test_fabrica_fields_cleared_without_edges() {
        let ctx = context().await;
        ctx.store
            .create_entity(
                EntityType::Jingle,
                "j00000001",
                &props(json!({"fabricaId": "dQw4w9WgXcQ", "fabricaDate": "2023-04-01"})),
            )
            .await
            .unwrap();

        let script = FieldDriftScript::new(DriftKind::JingleFabrica);
        let fix = script.run(&ctx, ScriptMode::Fix).await.unwrap();
        assert_eq!(fix.issues.len(), 1);
        assert_eq!(fix.fixed, 1);

        let jingle = ctx.store.entity("j00000001").await.unwrap().unwrap();
        assert_eq!(jingle.property("fabricaId"), None);
        assert_eq!(jingle.property("fabricaDate"), None);
    }

    #[tokio::test]
    async fn test_sorted_author_ids_are_not_drift() {
        let ctx = context().await;
        ctx.store
            .create_entity(EntityType::Cancion, "c00000001", &props(json!({"autorIds": ["a00000001", "a00000002"]})))
            .await
            .unwrap();
        for artista in ["a00000002", "a00000001"] {
            ctx.store.create_entity(EntityType::Artista, artista, &PropertyMap::new()).await.unwrap();
            ctx.store
                .create_edge(RelationshipType::AuthoredBy, artista, "c00000001", &PropertyMap::new())
                .await
                .unwrap();
        }

        let script = FieldDriftScript::new(DriftKind::CancionAutor);
        let check = script.run(&ctx, ScriptMode::Check).await.unwrap();
        assert!(check.issues.is_empty());
    }

    #[tokio::test]
    async fn test_stale_fabrica_date_is_rewritten() {
        let ctx = context().await;
        ctx.store
            .create_entity(EntityType::Fabrica, "dQw4w9WgXcQ", &props(json!({"date": "2023-04-01"})))
            .await
            .unwrap();
        ctx.store
            .create_entity(
                EntityType::Jingle,
                "j00000001",
                &props(json!({"fabricaId": "dQw4w9WgXcQ", "fabricaDate": "2023-04-01"})),
            )
            .await
            .unwrap();
        ctx.store
            .create_edge(RelationshipType::AppearsIn, "j00000001", "dQw4w9WgXcQ", &PropertyMap::new())
            .await
            .unwrap();

        let script = FieldDriftScript::new(DriftKind::JingleFabrica);
        assert!(script.run(&ctx, ScriptMode::Check).await.unwrap().issues.is_empty());

        // Date edited directly in the store, bypassing the synchronizer
        ctx.store
            .update_entity_fields("dQw4w9WgXcQ", &props(json!({"date": "2024-09-09"})))
            .await
            .unwrap();

        let fix = script.run(&ctx, ScriptMode::Fix).await.unwrap();
        assert_eq!(fix.issues.len(), 1);
        assert!(fix.issues[0].description.contains("fabricaDate"));
        assert_eq!(fix.fixed, 1);

        let jingle = ctx.store.entity("j00000001").await.unwrap().unwrap();
        assert_eq!(jingle.str_property("fabricaDate"), Some("2024-09-09"));
        assert!(script.run(&ctx, ScriptMode::Check).await.unwrap().issues.is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_jingle_does_not_stop_the_batch() {
        let ctx = context().await;
        ctx.store.create_entity(EntityType::Cancion, "c00000001", &PropertyMap::new()).await.unwrap();
        let mut broken = 0;
        for jingle in ["j00000001", "j00000002"] {
            ctx.store
                .create_entity(EntityType::Jingle, jingle, &props(json!({"cancionId": "c00000009"})))
                .await
                .unwrap();
            broken = ctx
                .store
                .create_edge(RelationshipType::VersionOf, jingle, "c00000001", &PropertyMap::new())
                .await
                .unwrap();
        }
        sqlx::query("UPDATE relationships SET properties = 'not json' WHERE rel_id = ?")
            .bind(broken)
            .execute(ctx.store.pool())
            .await
            .unwrap();

        let fix = FieldDriftScript::new(DriftKind::JingleCancion)
            .run(&ctx, ScriptMode::Fix)
            .await
            .unwrap();
        assert_eq!(fix.examined, 2);
        assert_eq!(fix.errors.len(), 1);
        assert!(fix.errors[0].starts_with("j00000002"));
        assert_eq!(fix.fixed, 1);

        let jingle = ctx.store.entity("j00000001").await.unwrap().unwrap();
        assert_eq!(jingle.str_property("cancionId"), Some("c00000001"));
    }
}
