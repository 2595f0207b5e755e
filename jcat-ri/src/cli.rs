//! Command-line front ends
//!
//! The binaries install logging and parse arguments; everything after that
//! lives here so modes and exit codes can be driven from tests.

use crate::audit::AuditReport;
use crate::cleanup::{CleanupContext, CleanupRegistry, ScriptMode, ScriptReport};
use crate::fix::FixReport;
use crate::report::{export_json, CliFormatter};
use crate::{AuditEngine, FixEngine};
use clap::{Parser, Subcommand};
use jcat_common::config::{DatabaseResolver, Settings};
use jcat_common::db::{init::open_database, GraphStore};
use jcat_common::{RelationshipSchema, RelationshipType};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Exit status for unknown relationship type names
pub const EXIT_INVALID_TYPES: u8 = 2;
/// Exit status for connection and other runtime failures
pub const EXIT_FAILURE: u8 = 1;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Invalid relationship type(s): {}\nValid types: {}", .invalid.join(", "), .valid.join(", "))]
    InvalidTypes {
        invalid: Vec<String>,
        valid: Vec<&'static str>,
    },

    #[error("Failed to open database {}: {source}", .path.display())]
    Connection {
        path: PathBuf,
        #[source]
        source: jcat_common::Error,
    },

    #[error("Failed to write report to {}: {source}", .path.display())]
    Export {
        path: PathBuf,
        #[source]
        source: jcat_common::Error,
    },

    #[error(transparent)]
    Catalog(#[from] jcat_common::Error),
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::InvalidTypes { .. } => EXIT_INVALID_TYPES,
            _ => EXIT_FAILURE,
        }
    }
}

// =============================================================================
// jcat-audit
// =============================================================================

/// Relationship integrity audit
#[derive(Parser, Debug)]
#[clap(name = "jcat-audit")]
#[clap(about = "Audit catalog relationships and repair reversed or redundant edges")]
pub struct AuditArgs {
    /// Preview repairs without writing
    #[clap(long, default_value_t = true, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true")]
    pub dry_run: bool,

    /// Apply repairs (overrides --dry-run)
    #[clap(long)]
    pub fix: bool,

    /// Comma-separated relationship types to audit (default: all)
    #[clap(long, value_name = "TYPES")]
    pub relationship_types: Option<String>,

    /// Write the JSON audit report to this file
    #[clap(long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Database file (default: JCAT_DATABASE, then config file, then data dir)
    #[clap(long, value_name = "PATH")]
    pub database: Option<PathBuf>,

    /// Config file (default: ~/.config/jcat/config.toml or /etc/jcat/config.toml)
    #[clap(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Relationship types (and fix groups) processed at once
    #[clap(long)]
    pub concurrency: Option<usize>,
}

/// What `jcat-audit` does after the audit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditMode {
    /// `--dry-run false` without `--fix`
    ReportOnly,
    Preview,
    Apply,
}

impl AuditArgs {
    pub fn mode(&self) -> AuditMode {
        if self.fix {
            AuditMode::Apply
        } else if self.dry_run {
            AuditMode::Preview
        } else {
            AuditMode::ReportOnly
        }
    }

    /// Parsed `--relationship-types`, `None` meaning every type
    pub fn relationship_types(&self, schema: &RelationshipSchema) -> Result<Option<Vec<RelationshipType>>, CliError> {
        match &self.relationship_types {
            None => Ok(None),
            Some(list) => schema
                .parse_type_list(list)
                .map(Some)
                .map_err(|invalid| CliError::InvalidTypes {
                    invalid,
                    valid: schema.valid_names(),
                }),
        }
    }
}

/// Everything one `jcat-audit` run produced
#[derive(Debug)]
pub struct AuditOutcome {
    pub audit: AuditReport,
    /// Preview or real repair, when there was anything to repair
    pub fix: Option<FixReport>,
    /// Re-audit after a real repair
    pub verification: Option<AuditReport>,
}

/// Audit, then preview or apply repairs, printing as it goes
pub async fn run_audit(args: &AuditArgs) -> Result<AuditOutcome, CliError> {
    let schema = Arc::new(RelationshipSchema::canonical());
    let types = args.relationship_types(&schema)?;

    let settings = settings(args.config.as_deref(), args.database.as_deref());
    let store = connect(&settings.database).await?;
    let concurrency = args.concurrency.unwrap_or(settings.integrity.concurrency);

    let auditor = AuditEngine::new(store.clone(), schema.clone()).with_concurrency(concurrency);
    let fixer = FixEngine::new(store, schema).with_concurrency(concurrency);

    let audit = auditor.audit(types.as_deref()).await;
    print!("{}", CliFormatter::format_audit(&audit));

    if let Some(path) = &args.output {
        export(&audit, path)?;
        println!("\n✓ Audit report written to: {}", path.display());
    }

    let mut outcome = AuditOutcome {
        audit,
        fix: None,
        verification: None,
    };
    if outcome.audit.is_clean() {
        info!("Nothing to repair");
        return Ok(outcome);
    }

    match args.mode() {
        AuditMode::Apply => {
            warn!("--fix given: relationships will be modified");
            println!(
                "\n⚠ Applying repairs to {} findings",
                outcome.audit.summary.incorrect + outcome.audit.summary.redundant
            );

            let fix = fixer.fix(&outcome.audit, false).await;
            print!("{}", CliFormatter::format_fix(&fix));

            let after = auditor
                .audit(Some(outcome.audit.relationship_types.as_slice()))
                .await;
            print!("\n{}", CliFormatter::format_verification(&after));

            outcome.fix = Some(fix);
            outcome.verification = Some(after);
        }
        AuditMode::Preview => {
            let preview = fixer.fix(&outcome.audit, true).await;
            print!("{}", CliFormatter::format_fix(&preview));
            println!("\nRun with --fix to apply.");
            outcome.fix = Some(preview);
        }
        AuditMode::ReportOnly => {}
    }

    Ok(outcome)
}

// =============================================================================
// jcat-cleanup
// =============================================================================

/// Catalog cleanup scripts
#[derive(Parser, Debug)]
#[clap(name = "jcat-cleanup")]
#[clap(about = "List and run catalog data-quality scripts")]
pub struct CleanupArgs {
    #[clap(subcommand)]
    pub command: CleanupCommand,

    /// Database file (default: JCAT_DATABASE, then config file, then data dir)
    #[clap(long, value_name = "PATH", global = true)]
    pub database: Option<PathBuf>,

    /// Config file (default: ~/.config/jcat/config.toml or /etc/jcat/config.toml)
    #[clap(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Write the JSON script report(s) to this file
    #[clap(long, value_name = "FILE", global = true)]
    pub output: Option<PathBuf>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum CleanupCommand {
    /// List registered scripts
    List,
    /// Run one script (check only unless --fix)
    Run {
        /// Script id, as shown by `list`
        id: String,
        /// Repair what the script finds
        #[clap(long)]
        fix: bool,
    },
    /// Run every automatable script in fix mode
    Automate,
}

/// List scripts or run them, printing as it goes
///
/// Returns the reports of the scripts that ran (none for `list`).
pub async fn run_cleanup(args: &CleanupArgs) -> Result<Vec<ScriptReport>, CliError> {
    let schema = Arc::new(RelationshipSchema::canonical());
    let registry = CleanupRegistry::with_builtin_scripts(&schema)?;

    if args.command == CleanupCommand::List {
        print!("{}", CliFormatter::format_script_list(&registry.list()));
        return Ok(Vec::new());
    }

    let settings = settings(args.config.as_deref(), args.database.as_deref());
    let store = connect(&settings.database).await?;

    // No metadata client ships with the runner; enrichment scripts only report
    let ctx = CleanupContext::with_config(store, schema, &settings.integrity);

    let reports = match &args.command {
        CleanupCommand::List => Vec::new(),
        CleanupCommand::Run { id, fix } => {
            let mode = if *fix { ScriptMode::Fix } else { ScriptMode::Check };
            vec![registry.execute(&ctx, id, mode).await?]
        }
        CleanupCommand::Automate => registry.automate(&ctx).await,
    };

    for report in &reports {
        print!("{}", CliFormatter::format_script_report(report));
    }

    if let Some(path) = &args.output {
        export(&reports, path)?;
        println!("\n✓ Script reports written to: {}", path.display());
    }

    Ok(reports)
}

// -----------------------------------------------------------------------------

fn settings(config: Option<&Path>, database: Option<&Path>) -> Settings {
    let mut resolver = DatabaseResolver::new();
    if let Some(config) = config {
        resolver = resolver.with_config_file(Some(config.to_path_buf()));
    }
    resolver.settings(database)
}

async fn connect(path: &Path) -> Result<GraphStore, CliError> {
    let pool = open_database(path).await.map_err(|source| CliError::Connection {
        path: path.to_path_buf(),
        source,
    })?;
    info!("✓ Connected to database {}", path.display());
    Ok(GraphStore::new(pool))
}

fn export<T: serde::Serialize>(report: &T, path: &Path) -> Result<(), CliError> {
    export_json(report, path).map_err(|source| CliError::Export {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dry_run_defaults_to_true() {
        let args = AuditArgs::try_parse_from(["jcat-audit"]).unwrap();
        assert!(args.dry_run);
        assert_eq!(args.mode(), AuditMode::Preview);
    }

    #[test]
    fn test_dry_run_flag_forms() {
        let bare = AuditArgs::try_parse_from(["jcat-audit", "--dry-run"]).unwrap();
        assert!(bare.dry_run);

        let off = AuditArgs::try_parse_from(["jcat-audit", "--dry-run", "false"]).unwrap();
        assert_eq!(off.mode(), AuditMode::ReportOnly);

        let fix = AuditArgs::try_parse_from(["jcat-audit", "--dry-run", "true", "--fix"]).unwrap();
        assert_eq!(fix.mode(), AuditMode::Apply);
    }

    #[test]
    fn test_unknown_relationship_type_exits_2() {
        let args =
            AuditArgs::try_parse_from(["jcat-audit", "--relationship-types", "APPEARS_IN,LIKES"]).unwrap();
        let err = args
            .relationship_types(&RelationshipSchema::canonical())
            .unwrap_err();
        assert_eq!(err.exit_code(), EXIT_INVALID_TYPES);
        let message = err.to_string();
        assert!(message.contains("LIKES"));
        assert!(message.contains("Valid types:"));
    }

    #[test]
    fn test_cleanup_subcommands_parse() {
        let args = CleanupArgs::try_parse_from(["jcat-cleanup", "run", "fabrica-order-gaps", "--fix"]).unwrap();
        assert_eq!(
            args.command,
            CleanupCommand::Run {
                id: "fabrica-order-gaps".to_string(),
                fix: true
            }
        );

        let args = CleanupArgs::try_parse_from(["jcat-cleanup", "automate", "--database", "/tmp/x.db"]).unwrap();
        assert_eq!(args.command, CleanupCommand::Automate);
        assert_eq!(args.database, Some(PathBuf::from("/tmp/x.db")));
    }
}
