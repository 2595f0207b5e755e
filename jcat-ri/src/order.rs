//! Dense ordering of jingles inside a fabrica
//!
//! Every `APPEARS_IN` edge into a fabrica gets an `order` property `1..N`,
//! ascending by the edge's `timestamp`. The sort is stable: equal timestamps
//! keep read (insertion) order and are reported as a warning. Missing or
//! unparseable timestamps sort after all parsed ones.

use jcat_common::db::{fields, GraphStore, RelationshipRecord};
use jcat_common::events::{CatalogEvent, EventBus};
use jcat_common::time::parse_timestamp_seconds;
use jcat_common::{RelationshipType, Result};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// One child to be ordered
#[derive(Debug, Clone, PartialEq)]
pub struct OrderInput {
    pub rel_id: i64,
    pub child_id: String,
    pub timestamp: Option<Value>,
}

impl From<&RelationshipRecord> for OrderInput {
    fn from(edge: &RelationshipRecord) -> Self {
        Self {
            rel_id: edge.rel_id,
            child_id: edge.start_id.clone(),
            timestamp: edge.properties.get(fields::TIMESTAMP).cloned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderAssignment {
    pub rel_id: i64,
    pub child_id: String,
    pub order: u32,
    /// Parsed timestamp, `None` when missing or unparseable
    pub seconds: Option<f64>,
}

/// Result of [`assign_dense_order`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DenseOrder {
    /// In order position
    pub assignments: Vec<OrderAssignment>,
    /// Children sharing an identical timestamp, one group per timestamp
    pub ties: Vec<Vec<String>>,
    /// Children whose timestamp is missing or could not be parsed
    pub unparsed: Vec<String>,
}

/// Assign `1..N` by ascending timestamp
///
/// Pure; the input order is the tie-break.
pub fn assign_dense_order(children: &[OrderInput]) -> DenseOrder {
    let mut parsed: Vec<(&OrderInput, Option<f64>)> = children
        .iter()
        .map(|c| (c, c.timestamp.as_ref().and_then(parse_timestamp_seconds)))
        .collect();

    // Stable: equal keys keep input order
    parsed.sort_by(|(_, a), (_, b)| match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(b),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });

    let mut result = DenseOrder::default();
    let mut current_tie: Vec<String> = Vec::new();
    let mut previous: Option<f64> = None;

    for (position, (child, seconds)) in parsed.into_iter().enumerate() {
        match seconds {
            Some(s) if previous == Some(s) => current_tie.push(child.child_id.clone()),
            Some(s) => {
                if current_tie.len() > 1 {
                    result.ties.push(std::mem::take(&mut current_tie));
                }
                current_tie = vec![child.child_id.clone()];
                previous = Some(s);
            }
            None => result.unparsed.push(child.child_id.clone()),
        }

        result.assignments.push(OrderAssignment {
            rel_id: child.rel_id,
            child_id: child.child_id.clone(),
            order: position as u32 + 1,
            seconds,
        });
    }
    if current_tie.len() > 1 {
        result.ties.push(current_tie);
    }

    result
}

/// Outcome of recomputing one fabrica
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderOutcome {
    pub container_id: String,
    #[serde(flatten)]
    pub order: DenseOrder,
    /// Edges whose stored order actually changed
    pub written: usize,
}

/// Keeps fabrica child order dense
#[derive(Debug, Clone)]
pub struct OrderManager {
    store: GraphStore,
}

impl OrderManager {
    pub fn new(store: GraphStore) -> Self {
        Self { store }
    }

    /// Recompute and persist the order of one fabrica
    ///
    /// Failures are logged and swallowed; callers are writes that already
    /// succeeded. Use [`OrderManager::try_recompute_order`] to observe them.
    pub async fn recompute_order(&self, container_id: &str) -> Option<OrderOutcome> {
        match self.try_recompute_order(container_id).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                error!(container_id, "Failed to recompute order: {}", e);
                None
            }
        }
    }

    pub async fn try_recompute_order(&self, container_id: &str) -> Result<OrderOutcome> {
        let edges = self.store.edges_into(RelationshipType::AppearsIn, container_id).await?;
        let inputs: Vec<OrderInput> = edges.iter().map(OrderInput::from).collect();
        let order = assign_dense_order(&inputs);

        for tie in &order.ties {
            warn!(
                container_id,
                children = ?tie,
                "Jingles share an identical timestamp; keeping insertion order"
            );
        }
        if !order.unparsed.is_empty() {
            warn!(
                container_id,
                children = ?order.unparsed,
                "Jingles without a usable timestamp placed last"
            );
        }

        let changes: Vec<(i64, u32)> = order
            .assignments
            .iter()
            .filter(|a| {
                let current = edges
                    .iter()
                    .find(|e| e.rel_id == a.rel_id)
                    .and_then(|e| e.properties.get(fields::ORDER))
                    .and_then(Value::as_u64);
                current != Some(u64::from(a.order))
            })
            .map(|a| (a.rel_id, a.order))
            .collect();

        let written = if changes.is_empty() {
            0
        } else {
            self.store.set_edge_orders(&changes).await?
        };

        debug!(
            container_id,
            children = order.assignments.len(),
            written,
            "Recomputed fabrica order"
        );

        Ok(OrderOutcome {
            container_id: container_id.to_string(),
            order,
            written,
        })
    }

    /// React to a catalog event; returns the outcome when a recompute ran
    pub async fn handle_event(&self, event: &CatalogEvent) -> Option<OrderOutcome> {
        match event {
            CatalogEvent::RelationshipChanged {
                rel_type: RelationshipType::AppearsIn,
                target_id,
                ..
            } => self.recompute_order(target_id).await,
            CatalogEvent::TimestampChanged { container_id, .. } => {
                self.recompute_order(container_id).await
            }
            _ => None,
        }
    }

    /// Subscribe to the bus and recompute orders in the background
    pub fn spawn_listener(self: Arc<Self>, bus: &EventBus) -> JoinHandle<()> {
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            info!("Order manager listening for catalog events");
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        self.handle_event(&event).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Order manager lagged {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Order manager listener stopped");
        })
    }
}
