//! Relationship direction audit
//!
//! Read-only scan of relationship types. Per type: one bulk read of all
//! edges, id classification of both endpoints, a direction check against the
//! schema registry and, for reversed edges only, one existence query for the
//! canonical counterpart. Parallel canonical copies are detected from the
//! bulk read itself.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use jcat_common::db::{Endpoint, GraphStore, PropertyMap, RelationshipRecord};
use jcat_common::ids::{self, EntityType};
use jcat_common::{RelationshipSchema, RelationshipSpec, RelationshipType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default number of relationship types audited at once
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Which end of an edge a finding refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeEnd {
    Start,
    End,
}

/// An edge stored against its canonical direction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncorrectRelationship {
    pub rel_id: i64,
    pub rel_type: RelationshipType,
    /// Stored start node
    pub start: Endpoint,
    /// Stored end node
    pub end: Endpoint,
    pub properties: PropertyMap,
    /// A canonical edge between the same two entities already exists
    pub has_duplicate: bool,
    /// The endpoints are exactly the canonical pair, reversed; only these can
    /// be repaired by swapping
    pub reversible: bool,
}

/// An endpoint id matching no known format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidIdRecord {
    pub rel_id: i64,
    pub rel_type: RelationshipType,
    pub position: EdgeEnd,
    pub id: String,
    pub error: String,
}

/// An extra canonical copy of an edge between the same ordered pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedundantRelationship {
    pub rel_id: i64,
    pub rel_type: RelationshipType,
    pub start_id: String,
    pub end_id: String,
    /// Lowest-id copy, which stays
    pub kept_rel_id: i64,
}

/// Failure that interrupted part of an audit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditError {
    pub rel_type: RelationshipType,
    /// Set when only one edge was affected; `None` when the whole type failed
    pub rel_id: Option<i64>,
    pub message: String,
}

/// Counters for one relationship type (or the whole run)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditCounts {
    pub total: usize,
    pub correct: usize,
    pub incorrect: usize,
    /// Incorrect edges whose canonical counterpart already exists
    pub duplicates: usize,
    pub invalid_ids: usize,
    pub redundant: usize,
}

impl AuditCounts {
    fn add(&mut self, other: &AuditCounts) {
        self.total += other.total;
        self.correct += other.correct;
        self.incorrect += other.incorrect;
        self.duplicates += other.duplicates;
        self.invalid_ids += other.invalid_ids;
        self.redundant += other.redundant;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeSummary {
    pub rel_type: RelationshipType,
    #[serde(flatten)]
    pub counts: AuditCounts,
}

/// Full audit result, serialized as-is by `--output`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub relationship_types: Vec<RelationshipType>,
    pub summary: AuditCounts,
    pub by_type: Vec<TypeSummary>,
    pub incorrect_relationships: Vec<IncorrectRelationship>,
    pub invalid_ids: Vec<InvalidIdRecord>,
    pub redundant_relationships: Vec<RedundantRelationship>,
    pub errors: Vec<AuditError>,
}

impl AuditReport {
    /// Equal findings, ignoring run identity and timing
    pub fn same_findings(&self, other: &AuditReport) -> bool {
        self.relationship_types == other.relationship_types
            && self.summary == other.summary
            && self.by_type == other.by_type
            && self.incorrect_relationships == other.incorrect_relationships
            && self.invalid_ids == other.invalid_ids
            && self.redundant_relationships == other.redundant_relationships
            && self.errors == other.errors
    }

    /// Nothing left to repair
    pub fn is_clean(&self) -> bool {
        self.summary.incorrect == 0 && self.summary.redundant == 0
    }
}

/// Result of auditing one relationship type
#[derive(Debug, Default)]
struct TypeAudit {
    counts: AuditCounts,
    incorrect: Vec<IncorrectRelationship>,
    invalid: Vec<InvalidIdRecord>,
    redundant: Vec<RedundantRelationship>,
    errors: Vec<AuditError>,
}

/// Read-only relationship audit
#[derive(Debug, Clone)]
pub struct AuditEngine {
    store: GraphStore,
    schema: Arc<RelationshipSchema>,
    concurrency: usize,
}

impl AuditEngine {
    pub fn new(store: GraphStore, schema: Arc<RelationshipSchema>) -> Self {
        Self {
            store,
            schema,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn schema(&self) -> &RelationshipSchema {
        &self.schema
    }

    /// Audit the given relationship types, or every registered type
    ///
    /// Never fails as a whole: read failures are recorded per type in
    /// `errors` and the remaining types are still audited.
    pub async fn audit(&self, types: Option<&[RelationshipType]>) -> AuditReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let types: Vec<RelationshipType> = match types {
            Some(types) if !types.is_empty() => types.to_vec(),
            _ => self.schema.all_types(),
        };

        info!(%run_id, types = types.len(), "Starting relationship audit");

        let mut results: Vec<(usize, RelationshipType, TypeAudit)> = stream::iter(types.iter().copied().enumerate())
            .map(|(index, rel_type)| async move { (index, rel_type, self.audit_type(rel_type).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        results.sort_by_key(|(index, _, _)| *index);

        let mut report = AuditReport {
            run_id,
            started_at,
            finished_at: started_at,
            relationship_types: types,
            summary: AuditCounts::default(),
            by_type: Vec::new(),
            incorrect_relationships: Vec::new(),
            invalid_ids: Vec::new(),
            redundant_relationships: Vec::new(),
            errors: Vec::new(),
        };

        for (_, rel_type, audit) in results {
            report.summary.add(&audit.counts);
            report.by_type.push(TypeSummary {
                rel_type,
                counts: audit.counts,
            });
            report.incorrect_relationships.extend(audit.incorrect);
            report.invalid_ids.extend(audit.invalid);
            report.redundant_relationships.extend(audit.redundant);
            report.errors.extend(audit.errors);
        }
        report.finished_at = Utc::now();

        info!(
            %run_id,
            total = report.summary.total,
            correct = report.summary.correct,
            incorrect = report.summary.incorrect,
            duplicates = report.summary.duplicates,
            invalid_ids = report.summary.invalid_ids,
            redundant = report.summary.redundant,
            errors = report.errors.len(),
            "Relationship audit complete"
        );

        report
    }

    async fn audit_type(&self, rel_type: RelationshipType) -> TypeAudit {
        let mut audit = TypeAudit::default();

        let Some(spec) = self.schema.canonical_direction(rel_type).copied() else {
            audit.errors.push(AuditError {
                rel_type,
                rel_id: None,
                message: "relationship type is not registered".to_string(),
            });
            return audit;
        };

        let edges = match self.store.edges_of_type(rel_type).await {
            Ok(edges) => edges,
            Err(e) => {
                warn!(rel_type = %rel_type, "Failed to read relationships: {}", e);
                audit.errors.push(AuditError {
                    rel_type,
                    rel_id: None,
                    message: e.to_string(),
                });
                return audit;
            }
        };

        debug!(rel_type = %rel_type, edges = edges.len(), "Auditing relationship type");
        audit.counts.total = edges.len();

        // First (lowest rel_id) canonical copy per ordered pair
        let mut canonical_pairs: HashMap<(String, String), i64> = HashMap::new();

        for edge in edges {
            let Some((start_type, end_type)) = self.classify_endpoints(&edge, &mut audit) else {
                continue;
            };

            if self.schema.is_direction_correct_for(rel_type, start_type, end_type) {
                audit.counts.correct += 1;
                let key = (edge.start_id.clone(), edge.end_id.clone());
                match canonical_pairs.get(&key) {
                    Some(&kept_rel_id) => {
                        audit.counts.redundant += 1;
                        audit.redundant.push(RedundantRelationship {
                            rel_id: edge.rel_id,
                            rel_type,
                            start_id: edge.start_id,
                            end_id: edge.end_id,
                            kept_rel_id,
                        });
                    }
                    None => {
                        canonical_pairs.insert(key, edge.rel_id);
                    }
                }
                continue;
            }

            let record = self
                .incorrect_record(&spec, edge, start_type, end_type, &mut audit)
                .await;
            audit.counts.incorrect += 1;
            if record.has_duplicate {
                audit.counts.duplicates += 1;
            }
            audit.incorrect.push(record);
        }

        audit
    }

    /// Classify both endpoints; records invalid ids and returns `None` for
    /// edges that cannot be direction-checked
    fn classify_endpoints(
        &self,
        edge: &RelationshipRecord,
        audit: &mut TypeAudit,
    ) -> Option<(EntityType, EntityType)> {
        let start = ids::classify(&edge.start_id);
        let end = ids::classify(&edge.end_id);

        for (position, id, classification) in [
            (EdgeEnd::Start, &edge.start_id, &start),
            (EdgeEnd::End, &edge.end_id, &end),
        ] {
            if !classification.valid {
                audit.counts.invalid_ids += 1;
                audit.invalid.push(InvalidIdRecord {
                    rel_id: edge.rel_id,
                    rel_type: edge.rel_type,
                    position,
                    id: id.clone(),
                    error: classification
                        .error
                        .clone()
                        .unwrap_or_else(|| "unrecognised id".to_string()),
                });
            }
        }

        Some((start.entity_type?, end.entity_type?))
    }

    async fn incorrect_record(
        &self,
        spec: &RelationshipSpec,
        edge: RelationshipRecord,
        start_type: EntityType,
        end_type: EntityType,
        audit: &mut TypeAudit,
    ) -> IncorrectRelationship {
        let reversible = start_type == spec.target && end_type == spec.source;

        let has_duplicate = if reversible {
            match self
                .store
                .edge_exists(spec.rel_type, spec.source, &edge.end_id, spec.target, &edge.start_id)
                .await
            {
                Ok(exists) => exists,
                Err(e) => {
                    warn!(
                        rel_type = %spec.rel_type,
                        edge_id = edge.rel_id,
                        "Counterpart check failed: {}", e
                    );
                    audit.errors.push(AuditError {
                        rel_type: spec.rel_type,
                        rel_id: Some(edge.rel_id),
                        message: e.to_string(),
                    });
                    false
                }
            }
        } else {
            false
        };

        IncorrectRelationship {
            rel_id: edge.rel_id,
            rel_type: spec.rel_type,
            start: Endpoint {
                id: edge.start_id,
                entity_type: Some(start_type),
                label: edge.start_label,
            },
            end: Endpoint {
                id: edge.end_id,
                entity_type: Some(end_type),
                label: edge.end_label,
            },
            properties: edge.properties,
            has_duplicate,
            reversible,
        }
    }
}
