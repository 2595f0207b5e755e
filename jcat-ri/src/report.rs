//! Report formatting and JSON export
//!
//! Human-readable CLI output for audit, fix and cleanup runs, plus JSON
//! export for `--output`.

use crate::audit::AuditReport;
use crate::cleanup::{ScriptInfo, ScriptReport};
use crate::fix::{FixAction, FixReport};
use jcat_common::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n";

/// Write any report as pretty JSON
pub fn export_json<T: Serialize, P: AsRef<Path>>(report: &T, path: P) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    let mut file = File::create(path)?;
    file.write_all(json.as_bytes())?;
    file.write_all(b"\n")?;
    Ok(())
}

/// Read a report written by [`export_json`]
pub fn import_json<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// CLI formatter for integrity reports
pub struct CliFormatter;

impl CliFormatter {
    /// Counts per type, then one line per finding
    pub fn format_audit(report: &AuditReport) -> String {
        let mut output = String::new();

        output.push_str("\nRelationship audit\n");
        output.push_str(RULE);
        output.push_str(&format!(
            "{:<14} {:>8} {:>8} {:>10} {:>11} {:>12} {:>10}\n",
            "type", "total", "correct", "incorrect", "duplicates", "invalid ids", "redundant"
        ));
        for summary in &report.by_type {
            let c = &summary.counts;
            output.push_str(&format!(
                "{:<14} {:>8} {:>8} {:>10} {:>11} {:>12} {:>10}\n",
                summary.rel_type.storage_name(),
                c.total,
                c.correct,
                c.incorrect,
                c.duplicates,
                c.invalid_ids,
                c.redundant
            ));
        }
        let s = &report.summary;
        output.push_str(&format!(
            "{:<14} {:>8} {:>8} {:>10} {:>11} {:>12} {:>10}\n",
            "all", s.total, s.correct, s.incorrect, s.duplicates, s.invalid_ids, s.redundant
        ));
        output.push_str(RULE);

        if !report.incorrect_relationships.is_empty() {
            output.push_str("\nIncorrect direction:\n");
            for r in &report.incorrect_relationships {
                let note = match (r.reversible, r.has_duplicate) {
                    (false, _) => " (not reversible)",
                    (true, true) => " (canonical copy exists)",
                    (true, false) => "",
                };
                output.push_str(&format!(
                    "  #{} {} {} ({}) -> {} ({}){}\n",
                    r.rel_id,
                    r.rel_type.storage_name(),
                    r.start.id,
                    r.start.label.as_deref().unwrap_or("?"),
                    r.end.id,
                    r.end.label.as_deref().unwrap_or("?"),
                    note
                ));
            }
        }

        if !report.redundant_relationships.is_empty() {
            output.push_str("\nRedundant copies:\n");
            for r in &report.redundant_relationships {
                output.push_str(&format!(
                    "  #{} {} {} -> {} (keeping #{})\n",
                    r.rel_id,
                    r.rel_type.storage_name(),
                    r.start_id,
                    r.end_id,
                    r.kept_rel_id
                ));
            }
        }

        if !report.invalid_ids.is_empty() {
            output.push_str("\nInvalid ids:\n");
            for r in &report.invalid_ids {
                let position = match r.position {
                    crate::audit::EdgeEnd::Start => "start",
                    crate::audit::EdgeEnd::End => "end",
                };
                output.push_str(&format!(
                    "  #{} {} {} '{}': {}\n",
                    r.rel_id,
                    r.rel_type.storage_name(),
                    position,
                    r.id,
                    r.error
                ));
            }
        }

        if !report.errors.is_empty() {
            output.push_str("\nErrors:\n");
            for e in &report.errors {
                match e.rel_id {
                    Some(rel_id) => output.push_str(&format!(
                        "  {} #{}: {}\n",
                        e.rel_type.storage_name(),
                        rel_id,
                        e.message
                    )),
                    None => output.push_str(&format!("  {}: {}\n", e.rel_type.storage_name(), e.message)),
                }
            }
        }

        output
    }

    /// Totals, then every step that did not succeed
    pub fn format_fix(report: &FixReport) -> String {
        let mut output = String::new();

        let heading = if report.dry_run {
            "\nFix preview (dry run, nothing written)\n"
        } else {
            "\nFix results\n"
        };
        output.push_str(heading);
        output.push_str(RULE);
        output.push_str(&format!("Created: {}\n", report.created));
        output.push_str(&format!("Deleted: {}\n", report.deleted));
        output.push_str(&format!("Skipped: {}\n", report.skipped));
        output.push_str(&format!("Errors:  {}\n", report.errors));
        output.push_str(RULE);

        let skipped: Vec<_> = report
            .operations
            .iter()
            .filter(|op| op.action == FixAction::Skipped)
            .collect();
        if !skipped.is_empty() {
            output.push_str("\nSkipped:\n");
            for op in skipped {
                output.push_str(&format!(
                    "  #{} {} {} -> {}: {}\n",
                    op.rel_id,
                    op.rel_type.storage_name(),
                    op.start_id,
                    op.end_id,
                    op.reason.as_deref().unwrap_or("unknown")
                ));
            }
        }

        output
    }

    /// Post-fix verification line
    pub fn format_verification(after: &AuditReport) -> String {
        if after.summary.incorrect == 0 {
            "Verification: 0 incorrect relationships remain\n".to_string()
        } else {
            format!(
                "Verification: {} incorrect relationships remain\n",
                after.summary.incorrect
            )
        }
    }

    pub fn format_script_list(scripts: &[ScriptInfo]) -> String {
        let mut output = String::new();
        for script in scripts {
            let auto = if script.automatable { "auto" } else { "manual" };
            output.push_str(&format!(
                "{:<28} {:<16} {:<7} {}\n",
                script.id, script.category, auto, script.description
            ));
        }
        output
    }

    pub fn format_script_report(report: &ScriptReport) -> String {
        let mut output = format!(
            "[{}] {}: examined {}, issues {}, fixed {}, errors {}\n",
            report.mode,
            report.script_id,
            report.examined,
            report.issues.len(),
            report.fixed,
            report.errors.len()
        );
        for issue in &report.issues {
            output.push_str(&format!("  {}: {}\n", issue.entity_id, issue.description));
        }
        for error in &report.errors {
            output.push_str(&format!("  error: {}\n", error));
        }
        output
    }
}
