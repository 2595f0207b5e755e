use super::{CleanupContext, CleanupScript, ScriptCategory, ScriptMode, ScriptReport};
use crate::order::{assign_dense_order, OrderInput};
use async_trait::async_trait;
use jcat_common::db::fields;
use jcat_common::{EntityType, RelationshipType, Result};
use serde_json::Value;
use tracing::warn;

/// Fabricas whose stored jingle order is not the dense timestamp order
pub struct FabricaOrderGapsScript;

#[async_trait]
impl CleanupScript for FabricaOrderGapsScript {
    fn id(&self) -> &str {
        "fabrica-order-gaps"
    }

    fn description(&self) -> &str {
        "APPEARS_IN order missing, duplicated or out of timestamp order"
    }

    fn category(&self) -> ScriptCategory {
        ScriptCategory::Ordering
    }

    async fn run(&self, ctx: &CleanupContext, mode: ScriptMode) -> Result<ScriptReport> {
        let mut report = ScriptReport::new(self.id(), mode);
        let fabricas = ctx.store.entities_with_label(EntityType::Fabrica).await?;
        report.examined = fabricas.len();

        for fabrica in &fabricas {
            let edges = match ctx.store.edges_into(RelationshipType::AppearsIn, &fabrica.id).await {
                Ok(edges) => edges,
                Err(e) => {
                    warn!(fabrica_id = %fabrica.id, "Failed to read appearances: {}", e);
                    report.errors.push(format!("{}: {}", fabrica.id, e));
                    continue;
                }
            };
            let inputs: Vec<OrderInput> = edges.iter().map(OrderInput::from).collect();
            let expected = assign_dense_order(&inputs);

            let misplaced = expected
                .assignments
                .iter()
                .filter(|a| {
                    let stored = edges
                        .iter()
                        .find(|e| e.rel_id == a.rel_id)
                        .and_then(|e| e.properties.get(fields::ORDER))
                        .and_then(Value::as_u64);
                    stored != Some(u64::from(a.order))
                })
                .count();
            if misplaced == 0 {
                continue;
            }
            report.issue(
                &fabrica.id,
                format!("{} of {} jingles out of dense order", misplaced, edges.len()),
            );

            if mode == ScriptMode::Fix {
                match ctx.order_manager.try_recompute_order(&fabrica.id).await {
                    Ok(_) => report.fixed += 1,
                    Err(e) => report.errors.push(format!("{}: {}", fabrica.id, e)),
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

    #[tokio::test]
    async fn test_gap_detected_and_closed() {
        let store = GraphStore::new(open_in_memory().await.unwrap());
        let ctx = CleanupContext::new(store.clone(), Arc::new(RelationshipSchema::canonical()));
        store.create_entity(EntityType::Fabrica, "dQw4w9WgXcQ", &PropertyMap::new()).await.unwrap();

        // Orders 1 and 3: a gap left by a deleted appearance
        for (jingle, ts, order) in [("j00000001", "00:01:00", 1), ("j00000002", "00:02:00", 3)] {
            store.create_entity(EntityType::Jingle, jingle, &PropertyMap::new()).await.unwrap();
            let props = json!({"timestamp": ts, "order": order}).as_object().cloned().unwrap();
            store
                .create_edge(RelationshipType::AppearsIn, jingle, "dQw4w9WgXcQ", &props)
                .await
                .unwrap();
        }

        let check = FabricaOrderGapsScript.run(&ctx, ScriptMode::Check).await.unwrap();
        assert_eq!(check.issues.len(), 1);
        assert_eq!(check.issues[0].entity_id, "dQw4w9WgXcQ");

        let fix = FabricaOrderGapsScript.run(&ctx, ScriptMode::Fix).await.unwrap();
        assert_eq!(fix.fixed, 1);

        let orders: Vec<Option<u64>> = store
            .edges_into(RelationshipType::AppearsIn, "dQw4w9WgXcQ")
            .await
            .unwrap()
            .iter()
            .map(|e| e.properties.get("order").and_then(Value::as_u64))
            .collect();
        assert_eq!(orders, vec![Some(1), Some(2)]);
    }

    #[tokio::test]
    async fn test_unreadable_fabrica_does_not_stop_the_batch() {
        let store = GraphStore::new(open_in_memory().await.unwrap());
        let ctx = CleanupContext::new(store.clone(), Arc::new(RelationshipSchema::canonical()));

        let mut broken = 0;
        for (fabrica, jingle) in [("aaaaaaaaaaa", "j00000001"), ("bbbbbbbbbbb", "j00000002")] {
            store.create_entity(EntityType::Fabrica, fabrica, &PropertyMap::new()).await.unwrap();
            let props = json!({"timestamp": "00:01:00", "order": 4}).as_object().cloned().unwrap();
            broken = store
                .create_edge(RelationshipType::AppearsIn, jingle, fabrica, &props)
                .await
                .unwrap();
        }
        sqlx::query("UPDATE relationships SET properties = 'not json' WHERE rel_id = ?")
            .bind(broken)
            .execute(store.pool())
            .await
            .unwrap();

        let fix = FabricaOrderGapsScript.run(&ctx, ScriptMode::Fix).await.unwrap();
        assert_eq!(fix.examined, 2);
        assert_eq!(fix.errors.len(), 1);
        assert!(fix.errors[0].starts_with("bbbbbbbbbbb"));
        assert_eq!(fix.fixed, 1);

        let edges = store.edges_into(RelationshipType::AppearsIn, "aaaaaaaaaaa").await.unwrap();
        assert_eq!(edges[0].properties.get("order"), Some(&json!(1)));
    }
}
