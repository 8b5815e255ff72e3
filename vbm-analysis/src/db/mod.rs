//! SQLite persistence for analysis jobs

pub mod jobs;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::Result;

pub use jobs::JobStore;

/// Open (creating when missing) the database and its tables
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let newly_created = !db_path.exists();

    debug!(path = %db_path.display(), "Connecting to database");
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    init_tables(&pool).await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }
    Ok(pool)
}

/// Create tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analysis_jobs (
            id TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            recording_path TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            error_message TEXT,
            results TEXT,
            provenance TEXT,
            owner TEXT,
            heartbeat_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    add_missing_columns(pool).await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_analysis_jobs_status ON analysis_jobs(status)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Columns added after the first release; older databases get them here
const LATER_COLUMNS: &[(&str, &str)] = &[("owner", "TEXT"), ("heartbeat_at", "TEXT")];

async fn add_missing_columns(pool: &SqlitePool) -> Result<()> {
    let rows = sqlx::query("PRAGMA table_info(analysis_jobs)")
        .fetch_all(pool)
        .await?;
    let existing: Vec<String> = rows
        .iter()
        .map(|row| row.try_get::<String, _>("name"))
        .collect::<std::result::Result<_, _>>()?;

    for (name, sql_type) in LATER_COLUMNS {
        if existing.iter().any(|c| c == name) {
            continue;
        }
        sqlx::query(&format!("ALTER TABLE analysis_jobs ADD COLUMN {} {}", name, sql_type))
            .execute(pool)
            .await?;
        info!(column = *name, "Added missing analysis_jobs column");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_older_table_gains_ownership_columns() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vbm.db");
        let options = SqliteConnectOptions::new().filename(&path).create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await.unwrap();
        sqlx::query(
            "CREATE TABLE analysis_jobs (id TEXT PRIMARY KEY, status TEXT NOT NULL, \
             recording_path TEXT NOT NULL, created_at TEXT NOT NULL, updated_at TEXT NOT NULL, \
             error_message TEXT, results TEXT, provenance TEXT)",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool.close().await;

        let pool = init_database_pool(&path).await.unwrap();
        let names: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info('analysis_jobs')")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert!(names.contains(&"owner".to_string()));
        assert!(names.contains(&"heartbeat_at".to_string()));
    }
}
