use super::{CleanupContext, CleanupScript, ScriptCategory, ScriptMode, ScriptReport};
use crate::fix::FixAction;
use async_trait::async_trait;
use jcat_common::{RelationshipType, Result};

/// Audit one relationship type; in fix mode repair what the audit found
pub struct DirectionScript {
    rel_type: RelationshipType,
    id: String,
    description: String,
}

impl DirectionScript {
    pub fn new(rel_type: RelationshipType) -> Self {
        Self {
            rel_type,
            id: format!("direction-{}", rel_type.kebab_name()),
            description: format!(
                "Reversed, redundant and malformed {} relationships",
                rel_type.storage_name()
            ),
        }
    }
}

#[async_trait]
impl CleanupScript for DirectionScript {
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn category(&self) -> ScriptCategory {
        ScriptCategory::Relationships
    }

    async fn run(&self, ctx: &CleanupContext, mode: ScriptMode) -> Result<ScriptReport> {
        let mut report = ScriptReport::new(&self.id, mode);
        let audit = ctx.audit_engine().audit(Some(&[self.rel_type])).await;

        report.examined = audit.summary.total;
        for incorrect in &audit.incorrect_relationships {
            report.issue(
                &incorrect.start.id,
                format!(
                    "edge {} runs {} -> {} against canonical direction",
                    incorrect.rel_id, incorrect.start.id, incorrect.end.id
                ),
            );
        }
        for redundant in &audit.redundant_relationships {
            report.issue(
                &redundant.start_id,
                format!(
                    "edge {} duplicates edge {} to {}",
                    redundant.rel_id, redundant.kept_rel_id, redundant.end_id
                ),
            );
        }
        for invalid in &audit.invalid_ids {
            report.issue(
                &invalid.id,
                format!("edge {} has an invalid id: {}", invalid.rel_id, invalid.error),
            );
        }
        report
            .errors
            .extend(audit.errors.iter().map(|e| e.message.clone()));

        if mode == ScriptMode::Fix && !audit.is_clean() {
            let fix = ctx.fix_engine().fix(&audit, false).await;
            report.fixed = fix
                .operations
                .iter()
                .filter(|op| op.action != FixAction::Skipped)
                .count();
            report.errors.extend(
                fix.operations
                    .iter()
                    .filter_map(|op| op.reason.as_deref())
                    .filter(|reason| reason.starts_with("error:"))
                    .map(str::to_string),
            );
        }

        Ok(report)
    }
}
