use super::{CleanupContext, CleanupScript, ScriptCategory, ScriptMode, ScriptReport};
use async_trait::async_trait;
use jcat_common::db::{fields, EntityRecord, PropertyMap};
use jcat_common::events::ChangeOp;
use jcat_common::{EntityType, RelationshipType, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Artist suggested by a metadata source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtistCandidate {
    pub name: String,
    /// 0.0 to 1.0
    pub confidence: f64,
}

/// External music-metadata search
#[async_trait]
pub trait MetadataLookup: Send + Sync {
    /// Candidate authors of the song titled `title`
    async fn find_song_artists(&self, title: &str) -> Result<Vec<ArtistCandidate>>;
}

/// Canciones with no `AUTOR_DE` edge
///
/// Fix mode links an existing Artista whose `nombre` exactly matches the
/// best candidate above the confidence threshold. Needs a human to review
/// the results, so it never runs unattended.
pub struct CancionMissingAutorScript;

impl CancionMissingAutorScript {
    async fn artists_by_name(ctx: &CleanupContext) -> Result<HashMap<String, Vec<String>>> {
        let mut by_name: HashMap<String, Vec<String>> = HashMap::new();
        for artista in ctx.store.entities_with_label(EntityType::Artista).await? {
            if let Some(nombre) = artista.str_property(fields::NOMBRE) {
                by_name.entry(nombre.to_string()).or_default().push(artista.id.clone());
            }
        }
        Ok(by_name)
    }

    /// Try to link one cancion; returns the issue description
    async fn resolve(
        ctx: &CleanupContext,
        lookup: &dyn MetadataLookup,
        cancion: &EntityRecord,
        artists: Option<&HashMap<String, Vec<String>>>,
        report: &mut ScriptReport,
    ) -> String {
        let Some(title) = cancion.str_property(fields::TITULO) else {
            return "no authors; no title to look up".to_string();
        };

        let candidates = match lookup.find_song_artists(title).await {
            Ok(candidates) => candidates,
            Err(e) => {
                report.errors.push(format!("{}: lookup failed: {}", cancion.id, e));
                return "no authors; lookup failed".to_string();
            }
        };

        let best = candidates
            .iter()
            .filter(|c| c.confidence >= ctx.lookup_confidence_threshold)
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence));
        let Some(best) = best else {
            return format!(
                "no authors; no candidate for '{}' at confidence >= {}",
                title, ctx.lookup_confidence_threshold
            );
        };

        let Some(artists) = artists else {
            return format!("no authors; suggested '{}' ({:.2})", best.name, best.confidence);
        };

        let artista_id = match artists.get(&best.name).map(Vec::as_slice) {
            Some([id]) => id,
            Some(ids) if ids.len() > 1 => {
                return format!("no authors; '{}' matches {} artistas", best.name, ids.len());
            }
            _ => return format!("no authors; no Artista named '{}'", best.name),
        };

        match ctx
            .store
            .create_edge(RelationshipType::AuthoredBy, artista_id, &cancion.id, &PropertyMap::new())
            .await
        {
            Ok(rel_id) => {
                info!(
                    cancion_id = %cancion.id,
                    artista_id = %artista_id,
                    edge_id = rel_id,
                    confidence = best.confidence,
                    "Linked author from metadata lookup"
                );
                let sync = ctx
                    .synchronizer
                    .on_relationship_change(RelationshipType::AuthoredBy, artista_id, &cancion.id, ChangeOp::Create)
                    .await;
                report.errors.extend(sync.errors);
                report.fixed += 1;
                format!("no authors; linked '{}' ({})", best.name, artista_id)
            }
            Err(e) => {
                report.errors.push(format!("{}: {}", cancion.id, e));
                format!("no authors; failed to link '{}'", best.name)
            }
        }
    }
}

#[async_trait]
impl CleanupScript for CancionMissingAutorScript {
    fn id(&self) -> &str {
        "cancion-missing-autor"
    }

    fn description(&self) -> &str {
        "Canciones without any AUTOR_DE relationship"
    }

    fn category(&self) -> ScriptCategory {
        ScriptCategory::Enrichment
    }

    fn automatable(&self) -> bool {
        false
    }

    async fn run(&self, ctx: &CleanupContext, mode: ScriptMode) -> Result<ScriptReport> {
        let mut report = ScriptReport::new(self.id(), mode);
        let canciones = ctx.store.entities_with_label(EntityType::Cancion).await?;
        report.examined = canciones.len();

        let artists = match (mode, &ctx.lookup) {
            (ScriptMode::Fix, Some(_)) => Some(Self::artists_by_name(ctx).await?),
            _ => None,
        };

        for cancion in &canciones {
            match ctx.store.edges_into(RelationshipType::AuthoredBy, &cancion.id).await {
                Ok(authors) if authors.is_empty() => {}
                Ok(_) => continue,
                Err(e) => {
                    warn!(cancion_id = %cancion.id, "Failed to read authors: {}", e);
                    report.errors.push(format!("{}: {}", cancion.id, e));
                    continue;
                }
            }

            let description = match &ctx.lookup {
                Some(lookup) => {
                    Self::resolve(ctx, lookup.as_ref(), cancion, artists.as_ref(), &mut report).await
                }
                None => "no authors".to_string(),
            };
            report.issue(&cancion.id, description);
        }

        if ctx.lookup.is_none() && !report.issues.is_empty() {
            debug!("No metadata lookup configured; missing authors reported only");
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jcat_common::db::init::open_in_memory;
    use jcat_common::db::GraphStore;
    use jcat_common::RelationshipSchema;
    use serde_json::{json, Value};
    use std::sync::Arc;

    struct FixedLookup(Vec<ArtistCandidate>);

    #[async_trait]
    impl MetadataLookup for FixedLookup {
        async fn find_song_artists(&self, _title: &str) -> Result<Vec<ArtistCandidate>> {
            Ok(self.0.clone())
        }
    }

    fn props(value: Value) -> PropertyMap {
        value.as_object().cloned().unwrap_or_default()
    }

    async fn seeded(candidates: Vec<ArtistCandidate>) -> CleanupContext {
        let store = GraphStore::new(open_in_memory().await.unwrap());
        store
            .create_entity(EntityType::Cancion, "c00000001", &props(json!({"title": "Mi Buenos Aires querido"})))
            .await
            .unwrap();
        store
            .create_entity(EntityType::Artista, "a00000001", &props(json!({"nombre": "Carlos Gardel"})))
            .await
            .unwrap();
        CleanupContext::new(store, Arc::new(RelationshipSchema::canonical()))
            .with_lookup(Arc::new(FixedLookup(candidates)))
    }

    fn candidate(name: &str, confidence: f64) -> ArtistCandidate {
        ArtistCandidate {
            name: name.to_string(),
            confidence,
        }
    }

    #[tokio::test]
    async fn test_confident_match_is_linked() {
        let ctx = seeded(vec![candidate("Alfredo Le Pera", 0.6), candidate("Carlos Gardel", 0.93)]).await;

        let check = CancionMissingAutorScript.run(&ctx, ScriptMode::Check).await.unwrap();
        assert_eq!(check.issues.len(), 1);
        assert_eq!(check.fixed, 0);

        let fix = CancionMissingAutorScript.run(&ctx, ScriptMode::Fix).await.unwrap();
        assert_eq!(fix.fixed, 1);

        let cancion = ctx.store.entity("c00000001").await.unwrap().unwrap();
        assert_eq!(cancion.properties.get("autorIds"), Some(&json!(["a00000001"])));

        let after = CancionMissingAutorScript.run(&ctx, ScriptMode::Check).await.unwrap();
        assert!(after.issues.is_empty());
    }

    #[tokio::test]
    async fn test_low_confidence_is_not_linked() {
        let ctx = seeded(vec![candidate("Carlos Gardel", 0.5)]).await;
        let fix = CancionMissingAutorScript.run(&ctx, ScriptMode::Fix).await.unwrap();
        assert_eq!(fix.issues.len(), 1);
        assert_eq!(fix.fixed, 0);
        assert!(ctx
            .store
            .edges_into(RelationshipType::AuthoredBy, "c00000001")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_unknown_artist_name_is_not_linked() {
        let ctx = seeded(vec![candidate("Carlos  Gardel", 0.99)]).await;
        let fix = CancionMissingAutorScript.run(&ctx, ScriptMode::Fix).await.unwrap();
        assert_eq!(fix.fixed, 0);
        assert!(fix.issues[0].description.contains("no Artista named"));
    }

    #[tokio::test]
    async fn test_unreadable_cancion_does_not_stop_the_batch() {
        let ctx = seeded(vec![candidate("Carlos Gardel", 0.93)]).await;
        ctx.store
            .create_entity(EntityType::Cancion, "c00000002", &props(json!({"title": "Volver"})))
            .await
            .unwrap();
        let broken = ctx
            .store
            .create_edge(RelationshipType::AuthoredBy, "a00000001", "c00000002", &PropertyMap::new())
            .await
            .unwrap();
        sqlx::query("UPDATE relationships SET properties = 'not json' WHERE rel_id = ?")
            .bind(broken)
            .execute(ctx.store.pool())
            .await
            .unwrap();

        let fix = CancionMissingAutorScript.run(&ctx, ScriptMode::Fix).await.unwrap();
        assert_eq!(fix.examined, 2);
        assert_eq!(fix.errors.len(), 1);
        assert!(fix.errors[0].starts_with("c00000002"));
        assert_eq!(fix.fixed, 1);
        assert_eq!(fix.issues[0].entity_id, "c00000001");
    }
}
