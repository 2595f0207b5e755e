//! Cleanup script runner
//!
//! **Usage:**
//! ```bash
//! jcat-cleanup list
//! jcat-cleanup run <script-id> [--fix]
//! jcat-cleanup automate
//! ```

use anyhow::Result;
use clap::Parser;
use jcat_ri::cli::{run_cleanup, CleanupArgs};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = CleanupArgs::parse();
    run_cleanup(&args).await?;
    Ok(())
}
