//! Relationship repair
//!
//! Consumes an [`AuditReport`] and repairs its findings:
//! - reversed edges are swapped into the canonical direction in one
//!   transaction, keeping their properties, or simply deleted when the
//!   canonical counterpart already exists
//! - redundant parallel copies are deleted, never the last copy
//!
//! Findings are grouped by relationship type and unordered endpoint pair.
//! Groups run concurrently; records inside a group run one after another, so
//! every decision is taken on state that includes the group's earlier writes.
//!
//! With an event bus attached, real repairs that change the canonical edge
//! set are announced like any other catalog write, so subscribed
//! synchronizers and order managers follow along.

use crate::audit::{AuditReport, IncorrectRelationship, RedundantRelationship};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use jcat_common::db::{GraphStore, RedundantPlan, SwapOutcome, SwapPlan};
use jcat_common::events::{CatalogEvent, ChangeOp, EventBus};
use jcat_common::{RelationshipSchema, RelationshipSpec, RelationshipType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub const REASON_NOT_FOUND: &str = "not found";
pub const REASON_ENDPOINT_NOT_FOUND: &str = "endpoint not found";
pub const REASON_NOT_REVERSIBLE: &str = "endpoint types match neither direction";
pub const REASON_LAST_COPY: &str = "last remaining copy";

/// Classification of one repair step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixAction {
    /// A canonical edge was created (the reversed one is gone)
    Created,
    /// An edge was deleted without a replacement
    Deleted,
    Skipped,
}

/// Kind of finding a step repaired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingKind {
    Incorrect,
    Redundant,
}

/// One repair step and its outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixOperation {
    pub rel_id: i64,
    pub rel_type: RelationshipType,
    pub kind: FindingKind,
    pub start_id: String,
    pub end_id: String,
    pub action: FixAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Id of the canonical edge created by a swap
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_rel_id: Option<i64>,
}

impl FixOperation {
    fn is_error(&self) -> bool {
        self.reason.as_deref().is_some_and(|r| r.starts_with("error:"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixReport {
    pub run_id: Uuid,
    pub audit_run_id: Uuid,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub created: usize,
    pub deleted: usize,
    pub skipped: usize,
    /// Skips caused by store failures
    pub errors: usize,
    pub operations: Vec<FixOperation>,
}

impl FixReport {
    /// `(rel_id, action, reason)` per step, for comparing runs
    pub fn classifications(&self) -> Vec<(i64, FixAction, Option<String>)> {
        self.operations
            .iter()
            .map(|op| (op.rel_id, op.action, op.reason.clone()))
            .collect()
    }

    /// Edge ids whose findings were not repaired
    pub fn skipped_rel_ids(&self) -> HashSet<i64> {
        self.operations
            .iter()
            .filter(|op| op.action == FixAction::Skipped)
            .map(|op| op.rel_id)
            .collect()
    }
}

enum Finding<'a> {
    Incorrect(&'a IncorrectRelationship),
    Redundant(&'a RedundantRelationship),
}

impl Finding<'_> {
    fn rel_id(&self) -> i64 {
        match self {
            Finding::Incorrect(r) => r.rel_id,
            Finding::Redundant(r) => r.rel_id,
        }
    }

    fn group_key(&self) -> (RelationshipType, String, String) {
        let (t, a, b) = match self {
            Finding::Incorrect(r) => (r.rel_type, &r.start.id, &r.end.id),
            Finding::Redundant(r) => (r.rel_type, &r.start_id, &r.end_id),
        };
        if a <= b {
            (t, a.clone(), b.clone())
        } else {
            (t, b.clone(), a.clone())
        }
    }

    fn operation(&self, action: FixAction, reason: Option<&str>) -> FixOperation {
        let (rel_type, kind, start_id, end_id) = match self {
            Finding::Incorrect(r) => (r.rel_type, FindingKind::Incorrect, &r.start.id, &r.end.id),
            Finding::Redundant(r) => (r.rel_type, FindingKind::Redundant, &r.start_id, &r.end_id),
        };
        FixOperation {
            rel_id: self.rel_id(),
            rel_type,
            kind,
            start_id: start_id.clone(),
            end_id: end_id.clone(),
            action,
            reason: reason.map(str::to_string),
            new_rel_id: None,
        }
    }
}

/// Simulated effects of earlier dry-run steps in the same group
#[derive(Default)]
struct DryRunState {
    /// A swap in this group already (virtually) created the counterpart
    counterpart_created: bool,
}

/// Repairs audit findings
#[derive(Debug, Clone)]
pub struct FixEngine {
    store: GraphStore,
    schema: Arc<RelationshipSchema>,
    concurrency: usize,
    bus: Option<EventBus>,
}

impl FixEngine {
    pub fn new(store: GraphStore, schema: Arc<RelationshipSchema>) -> Self {
        Self {
            store,
            schema,
            concurrency: crate::audit::DEFAULT_CONCURRENCY,
            bus: None,
        }
    }

    /// Announce swapped and removed edges on `bus`
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Repair (or, with `dry_run`, predict the repair of) every finding
    ///
    /// A dry run writes nothing and classifies each step exactly as a real
    /// run against the same data would.
    pub async fn fix(&self, report: &AuditReport, dry_run: bool) -> FixReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        let findings: Vec<Finding<'_>> = report
            .incorrect_relationships
            .iter()
            .map(Finding::Incorrect)
            .chain(report.redundant_relationships.iter().map(Finding::Redundant))
            .collect();

        info!(
            %run_id,
            dry_run,
            findings = findings.len(),
            "Starting relationship repair"
        );

        // Group members keep report order
        let mut groups: BTreeMap<(RelationshipType, String, String), Vec<(usize, &Finding<'_>)>> =
            BTreeMap::new();
        for (index, finding) in findings.iter().enumerate() {
            groups.entry(finding.group_key()).or_default().push((index, finding));
        }

        let pending: Vec<_> = groups
            .into_values()
            .map(|group| self.fix_group(group, dry_run))
            .collect();
        let mut results: Vec<(usize, FixOperation)> = stream::iter(pending)
            .buffer_unordered(self.concurrency)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .flatten()
            .collect();
        results.sort_by_key(|(index, _)| *index);

        let operations: Vec<FixOperation> = results.into_iter().map(|(_, op)| op).collect();
        let count = |action: FixAction| operations.iter().filter(|op| op.action == action).count();

        let fix_report = FixReport {
            run_id,
            audit_run_id: report.run_id,
            dry_run,
            started_at,
            finished_at: Utc::now(),
            created: count(FixAction::Created),
            deleted: count(FixAction::Deleted),
            skipped: count(FixAction::Skipped),
            errors: operations.iter().filter(|op| op.is_error()).count(),
            operations,
        };

        info!(
            %run_id,
            dry_run,
            created = fix_report.created,
            deleted = fix_report.deleted,
            skipped = fix_report.skipped,
            errors = fix_report.errors,
            "Relationship repair complete"
        );

        fix_report
    }

    async fn fix_group(
        &self,
        group: Vec<(usize, &Finding<'_>)>,
        dry_run: bool,
    ) -> Vec<(usize, FixOperation)> {
        let mut state = DryRunState::default();
        let mut operations = Vec::with_capacity(group.len());

        for (index, finding) in group {
            let op = match finding {
                Finding::Incorrect(record) => {
                    self.fix_incorrect(finding, record, dry_run, &mut state).await
                }
                Finding::Redundant(_) => self.fix_redundant(finding, dry_run).await,
            };
            operations.push((index, op));
        }

        operations
    }

    async fn fix_incorrect(
        &self,
        finding: &Finding<'_>,
        record: &IncorrectRelationship,
        dry_run: bool,
        state: &mut DryRunState,
    ) -> FixOperation {
        let Some(spec) = self.schema.canonical_direction(record.rel_type).copied() else {
            return finding.operation(FixAction::Skipped, Some("error: relationship type is not registered"));
        };

        if !record.reversible {
            warn!(
                rel_type = %record.rel_type,
                edge_id = record.rel_id,
                start = %record.start.id,
                end = %record.end.id,
                "Cannot repair relationship: {}", REASON_NOT_REVERSIBLE
            );
            return finding.operation(FixAction::Skipped, Some(REASON_NOT_REVERSIBLE));
        }

        if dry_run {
            self.preview_incorrect(finding, record, &spec, state).await
        } else {
            self.apply_incorrect(finding, record, &spec).await
        }
    }

    async fn apply_incorrect(
        &self,
        finding: &Finding<'_>,
        record: &IncorrectRelationship,
        spec: &RelationshipSpec,
    ) -> FixOperation {
        match self.store.swap_edge(record.rel_id, spec).await {
            Ok(SwapOutcome::Swapped { new_rel_id }) => {
                info!(
                    rel_type = %record.rel_type,
                    edge_id = record.rel_id,
                    new_edge_id = new_rel_id,
                    source = %record.end.id,
                    target = %record.start.id,
                    "Swapped relationship into canonical direction"
                );
                self.announce(record.rel_type, &record.end.id, &record.start.id, ChangeOp::Create);
                let mut op = finding.operation(FixAction::Created, None);
                op.new_rel_id = Some(new_rel_id);
                op
            }
            Ok(SwapOutcome::Deleted) => {
                info!(
                    rel_type = %record.rel_type,
                    edge_id = record.rel_id,
                    "Deleted reversed relationship; canonical counterpart exists"
                );
                finding.operation(FixAction::Deleted, None)
            }
            Ok(SwapOutcome::NotFound) => {
                info!(edge_id = record.rel_id, "Relationship already gone; skipping");
                finding.operation(FixAction::Skipped, Some(REASON_NOT_FOUND))
            }
            Ok(SwapOutcome::EndpointMissing) => {
                warn!(
                    rel_type = %record.rel_type,
                    edge_id = record.rel_id,
                    "Canonical endpoint missing; skipping"
                );
                finding.operation(FixAction::Skipped, Some(REASON_ENDPOINT_NOT_FOUND))
            }
            Err(e) => {
                warn!(edge_id = record.rel_id, "Swap failed: {}", e);
                finding.operation(FixAction::Skipped, Some(format!("error: {}", e).as_str()))
            }
        }
    }

    async fn preview_incorrect(
        &self,
        finding: &Finding<'_>,
        record: &IncorrectRelationship,
        spec: &RelationshipSpec,
        state: &mut DryRunState,
    ) -> FixOperation {
        let plan = match self.store.preview_swap(record.rel_id, spec).await {
            Ok(plan) => plan,
            Err(e) => {
                warn!(edge_id = record.rel_id, "Swap preview failed: {}", e);
                return finding.operation(FixAction::Skipped, Some(format!("error: {}", e).as_str()));
            }
        };

        let plan = match plan {
            SwapPlan::Recreate if state.counterpart_created => SwapPlan::DeleteOnly,
            plan => plan,
        };

        match plan {
            SwapPlan::Recreate => {
                state.counterpart_created = true;
                info!(
                    rel_type = %record.rel_type,
                    edge_id = record.rel_id,
                    source = %record.end.id,
                    target = %record.start.id,
                    "[dry run] Would swap relationship into canonical direction"
                );
                finding.operation(FixAction::Created, None)
            }
            SwapPlan::DeleteOnly => {
                info!(
                    rel_type = %record.rel_type,
                    edge_id = record.rel_id,
                    "[dry run] Would delete reversed relationship"
                );
                finding.operation(FixAction::Deleted, None)
            }
            SwapPlan::NotFound => finding.operation(FixAction::Skipped, Some(REASON_NOT_FOUND)),
            SwapPlan::EndpointMissing => {
                finding.operation(FixAction::Skipped, Some(REASON_ENDPOINT_NOT_FOUND))
            }
        }
    }

    async fn fix_redundant(&self, finding: &Finding<'_>, dry_run: bool) -> FixOperation {
        let rel_id = finding.rel_id();
        let result = if dry_run {
            self.store.preview_remove_redundant(rel_id).await
        } else {
            self.store.remove_redundant(rel_id).await
        };

        match result {
            Ok(RedundantPlan::Delete) => {
                if dry_run {
                    info!(edge_id = rel_id, "[dry run] Would delete redundant relationship copy");
                } else {
                    info!(edge_id = rel_id, "Deleted redundant relationship copy");
                    if let Finding::Redundant(record) = finding {
                        self.announce(record.rel_type, &record.start_id, &record.end_id, ChangeOp::Delete);
                    }
                }
                finding.operation(FixAction::Deleted, None)
            }
            Ok(RedundantPlan::NotFound) => finding.operation(FixAction::Skipped, Some(REASON_NOT_FOUND)),
            Ok(RedundantPlan::LastCopy) => finding.operation(FixAction::Skipped, Some(REASON_LAST_COPY)),
            Err(e) => {
                warn!(edge_id = rel_id, "Redundant copy removal failed: {}", e);
                finding.operation(FixAction::Skipped, Some(format!("error: {}", e).as_str()))
            }
        }
    }

    fn announce(&self, rel_type: RelationshipType, source_id: &str, target_id: &str, op: ChangeOp) {
        if let Some(bus) = &self.bus {
            bus.emit_lossy(CatalogEvent::relationship_changed(rel_type, source_id, target_id, op));
        }
    }
}
