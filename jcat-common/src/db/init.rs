//! Database initialization
//!
//! The property graph lives in two tables: `entities` (nodes with a label and
//! a JSON property bag) and `relationships` (typed, directed edges with their
//! own JSON property bag). Table creation is idempotent.

use crate::{Error, Result};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Current graph schema version
pub const SCHEMA_VERSION: i64 = 1;

/// Open or create the graph database and ensure the schema exists
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    apply_pragmas(&pool).await?;
    create_graph_schema(&pool).await?;

    Ok(pool)
}

/// Open an existing graph database; never creates one
///
/// Used by the audit tooling, which must fail fast on a wrong path instead of
/// auditing an empty file.
pub async fn open_database(db_path: &Path) -> Result<SqlitePool> {
    if !db_path.exists() {
        return Err(Error::NotFound(format!(
            "Database not found: {}",
            db_path.display()
        )));
    }

    let db_url = format!("sqlite://{}?mode=rw", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    apply_pragmas(&pool).await?;
    info!("Opened database: {}", db_path.display());

    Ok(pool)
}

/// Single-connection in-memory graph database with the schema applied
///
/// One connection only: every connection to `sqlite::memory:` is its own
/// database.
pub async fn open_in_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    create_graph_schema(&pool).await?;
    Ok(pool)
}

async fn apply_pragmas(pool: &SqlitePool) -> Result<()> {
    // WAL lets the audit read while the catalog API writes
    sqlx::query("PRAGMA journal_mode = WAL").execute(pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(pool).await?;
    Ok(())
}

/// Create graph tables and indexes if they do not exist
pub async fn create_graph_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entities (
            id TEXT PRIMARY KEY,
            label TEXT NOT NULL,
            properties TEXT NOT NULL DEFAULT '{}',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_entities_label ON entities(label)")
        .execute(pool)
        .await?;

    // rel_id doubles as the edge identity and the insertion order
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS relationships (
            rel_id INTEGER PRIMARY KEY AUTOINCREMENT,
            rel_type TEXT NOT NULL,
            start_id TEXT NOT NULL,
            end_id TEXT NOT NULL,
            properties TEXT NOT NULL DEFAULT '{}',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_relationships_start ON relationships(rel_type, start_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_relationships_end ON relationships(rel_type, end_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_schema() {
        let pool = open_in_memory().await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        assert_eq!(tables, vec!["entities", "relationships", "schema_version"]);
    }

    #[tokio::test]
    async fn test_schema_creation_is_idempotent() {
        let pool = open_in_memory().await.unwrap();
        create_graph_schema(&pool).await.unwrap();
        create_graph_schema(&pool).await.unwrap();

        let version: i64 = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }
}
