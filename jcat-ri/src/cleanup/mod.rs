//! Cleanup script registry
//!
//! Named data-quality checks over the catalog graph. Every script can run in
//! check mode (report only) or fix mode; automatable scripts are run in fix
//! mode by [`CleanupRegistry::automate`].

mod direction;
mod drift;
mod missing_autor;
mod order_gaps;

pub use direction::DirectionScript;
pub use drift::{DriftKind, FieldDriftScript};
pub use missing_autor::{ArtistCandidate, CancionMissingAutorScript, MetadataLookup};
pub use order_gaps::FabricaOrderGapsScript;

use crate::audit::AuditEngine;
use crate::fix::FixEngine;
use crate::order::OrderManager;
use crate::sync::Synchronizer;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jcat_common::config::IntegrityConfig;
use jcat_common::db::GraphStore;
use jcat_common::{Error, RelationshipSchema, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info};

/// How a script is run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptMode {
    /// Report issues, write nothing
    Check,
    /// Report and repair issues
    Fix,
}

impl fmt::Display for ScriptMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptMode::Check => f.pad("check"),
            ScriptMode::Fix => f.pad("fix"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptCategory {
    Relationships,
    Denormalization,
    Ordering,
    Enrichment,
}

impl fmt::Display for ScriptCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScriptCategory::Relationships => "relationships",
            ScriptCategory::Denormalization => "denormalization",
            ScriptCategory::Ordering => "ordering",
            ScriptCategory::Enrichment => "enrichment",
        };
        f.pad(name)
    }
}

/// One problem a script found
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptIssue {
    pub entity_id: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptReport {
    pub script_id: String,
    pub mode: ScriptMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Entities or edges looked at
    pub examined: usize,
    pub issues: Vec<ScriptIssue>,
    /// Issues repaired (fix mode only)
    pub fixed: usize,
    pub errors: Vec<String>,
}

impl ScriptReport {
    pub fn new(script_id: &str, mode: ScriptMode) -> Self {
        let now = Utc::now();
        Self {
            script_id: script_id.to_string(),
            mode,
            started_at: now,
            finished_at: now,
            examined: 0,
            issues: Vec::new(),
            fixed: 0,
            errors: Vec::new(),
        }
    }

    pub fn issue(&mut self, entity_id: &str, description: impl Into<String>) {
        self.issues.push(ScriptIssue {
            entity_id: entity_id.to_string(),
            description: description.into(),
        });
    }

    fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }
}

/// A named data-quality check
#[async_trait]
pub trait CleanupScript: Send + Sync {
    /// Stable identifier used on the command line
    fn id(&self) -> &str;

    fn description(&self) -> &str;

    fn category(&self) -> ScriptCategory;

    /// Whether [`CleanupRegistry::automate`] may run this script unattended
    fn automatable(&self) -> bool {
        true
    }

    async fn run(&self, ctx: &CleanupContext, mode: ScriptMode) -> Result<ScriptReport>;
}

/// Everything a script may use
#[derive(Clone)]
pub struct CleanupContext {
    pub store: GraphStore,
    pub schema: Arc<RelationshipSchema>,
    pub synchronizer: Synchronizer,
    pub order_manager: OrderManager,
    pub concurrency: usize,
    pub lookup: Option<Arc<dyn MetadataLookup>>,
    pub lookup_confidence_threshold: f64,
}

impl CleanupContext {
    pub fn new(store: GraphStore, schema: Arc<RelationshipSchema>) -> Self {
        Self::with_config(store, schema, &IntegrityConfig::default())
    }

    pub fn with_config(store: GraphStore, schema: Arc<RelationshipSchema>, config: &IntegrityConfig) -> Self {
        Self {
            synchronizer: Synchronizer::new(store.clone(), schema.clone()),
            order_manager: OrderManager::new(store.clone()),
            store,
            schema,
            concurrency: config.concurrency.max(1),
            lookup: None,
            lookup_confidence_threshold: config.lookup_confidence_threshold,
        }
    }

    pub fn with_lookup(mut self, lookup: Arc<dyn MetadataLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn audit_engine(&self) -> AuditEngine {
        AuditEngine::new(self.store.clone(), self.schema.clone()).with_concurrency(self.concurrency)
    }

    pub fn fix_engine(&self) -> FixEngine {
        FixEngine::new(self.store.clone(), self.schema.clone()).with_concurrency(self.concurrency)
    }
}

/// Listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptInfo {
    pub id: String,
    pub description: String,
    pub category: ScriptCategory,
    pub automatable: bool,
}

/// Registered cleanup scripts, in registration order
#[derive(Default)]
pub struct CleanupRegistry {
    scripts: Vec<Arc<dyn CleanupScript>>,
}

impl CleanupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in script
    ///
    /// Fails if two built-ins share an id.
    pub fn with_builtin_scripts(schema: &RelationshipSchema) -> Result<Self> {
        let mut registry = Self::new();
        let mut builtins: Vec<Arc<dyn CleanupScript>> = schema
            .all_types()
            .into_iter()
            .map(|t| Arc::new(DirectionScript::new(t)) as Arc<dyn CleanupScript>)
            .collect();
        builtins.extend([
            Arc::new(FieldDriftScript::new(DriftKind::JingleFabrica)) as Arc<dyn CleanupScript>,
            Arc::new(FieldDriftScript::new(DriftKind::JingleCancion)),
            Arc::new(FieldDriftScript::new(DriftKind::CancionAutor)),
            Arc::new(FabricaOrderGapsScript),
            Arc::new(CancionMissingAutorScript),
        ]);

        for script in builtins {
            registry.register(script)?;
        }
        Ok(registry)
    }

    /// Add a script; ids must be unique
    pub fn register(&mut self, script: Arc<dyn CleanupScript>) -> Result<()> {
        if self.get(script.id()).is_some() {
            return Err(Error::InvalidInput(format!(
                "cleanup script '{}' is already registered",
                script.id()
            )));
        }
        self.scripts.push(script);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn CleanupScript>> {
        self.scripts.iter().find(|s| s.id() == id)
    }

    pub fn list(&self) -> Vec<ScriptInfo> {
        self.scripts
            .iter()
            .map(|s| ScriptInfo {
                id: s.id().to_string(),
                description: s.description().to_string(),
                category: s.category(),
                automatable: s.automatable(),
            })
            .collect()
    }

    /// Run one script
    pub async fn execute(&self, ctx: &CleanupContext, id: &str, mode: ScriptMode) -> Result<ScriptReport> {
        let script = self
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("cleanup script '{}'", id)))?;

        info!(script = id, %mode, "Running cleanup script");
        let report = script.run(ctx, mode).await?.finish();
        info!(
            script = id,
            %mode,
            examined = report.examined,
            issues = report.issues.len(),
            fixed = report.fixed,
            errors = report.errors.len(),
            "Cleanup script complete"
        );
        Ok(report)
    }

    /// Run every automatable script in fix mode
    ///
    /// A script that fails outright still yields a report carrying the error.
    pub async fn automate(&self, ctx: &CleanupContext) -> Vec<ScriptReport> {
        let mut reports = Vec::new();
        for script in self.scripts.iter().filter(|s| s.automatable()) {
            match self.execute(ctx, script.id(), ScriptMode::Fix).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!(script = script.id(), "Cleanup script failed: {}", e);
                    let mut report = ScriptReport::new(script.id(), ScriptMode::Fix);
                    report.errors.push(e.to_string());
                    reports.push(report.finish());
                }
            }
        }
        reports
    }
}
