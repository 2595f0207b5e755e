//! Relationship audit and repair tool
//!
//! **Usage:**
//! ```bash
//! jcat-audit [--dry-run [true|false]] [--fix] [--relationship-types <list>] [--output <file>]
//! ```
//!
//! Audits relationship direction and endpoint ids. By default the repairs
//! are only previewed; `--fix` applies them and re-audits.

use clap::Parser;
use jcat_ri::cli::{run_audit, AuditArgs, CliError};
use std::process::ExitCode;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = AuditArgs::parse();

    match run_audit(&args).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e @ CliError::InvalidTypes { .. }) => {
            eprintln!("{}", e);
            ExitCode::from(e.exit_code())
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
