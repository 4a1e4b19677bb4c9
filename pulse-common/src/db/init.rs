//! Database initialization
//!
//! All tables are created with `CREATE TABLE IF NOT EXISTS`, so initialization
//! is idempotent and safe on every startup.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Open (creating if needed) the database file and its tables
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL allows concurrent readers with one writer
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_tables(&pool).await?;
    Ok(pool)
}

/// In-memory database with all tables, for tests and ephemeral runs
///
/// Every pooled connection to `sqlite::memory:` is its own database, so the
/// pool is limited to a single connection that is never recycled.
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    create_tables(&pool).await?;
    Ok(pool)
}

/// Create every table (idempotent)
pub async fn create_tables(pool: &SqlitePool) -> Result<()> {
    create_system_configurations_table(pool).await?;
    create_configuration_history_table(pool).await?;
    create_ai_operations_table(pool).await?;
    create_api_sessions_table(pool).await?;
    Ok(())
}

async fn create_system_configurations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS system_configurations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            category TEXT NOT NULL,
            key TEXT NOT NULL,
            environment TEXT NOT NULL,
            scope TEXT NOT NULL,
            value TEXT NOT NULL,
            validation_rules TEXT NOT NULL,
            business_rules TEXT NOT NULL DEFAULT '[]',
            description TEXT,
            version INTEGER NOT NULL DEFAULT 1 CHECK (version >= 1),
            updated_by TEXT,
            updated_at TEXT NOT NULL,
            UNIQUE (category, key, environment, scope)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_configuration_history_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS configuration_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            category TEXT NOT NULL,
            key TEXT NOT NULL,
            environment TEXT NOT NULL,
            scope TEXT NOT NULL,
            old_value TEXT,
            new_value TEXT NOT NULL,
            version INTEGER NOT NULL,
            changed_by TEXT NOT NULL,
            changed_at TEXT NOT NULL,
            reason TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_configuration_history_key ON configuration_history(category, key)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_ai_operations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ai_operations (
            id TEXT PRIMARY KEY,
            operation_type TEXT NOT NULL,
            priority TEXT NOT NULL,
            state TEXT NOT NULL,
            requested_by TEXT NOT NULL,
            input TEXT NOT NULL,
            context TEXT,
            settings TEXT NOT NULL,
            estimated_duration_ms INTEGER NOT NULL,
            result TEXT,
            error TEXT,
            created_at TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_ai_operations_state ON ai_operations(state)")
        .execute(pool)
        .await?;
    Ok(())
}

async fn create_api_sessions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS api_sessions (
            token_hash TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            display_name TEXT NOT NULL,
            role TEXT NOT NULL CHECK (role IN ('viewer', 'member', 'admin')),
            created_at TEXT NOT NULL,
            expires_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_tables_is_idempotent() {
        let pool = connect_in_memory().await.unwrap();
        create_tables(&pool).await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(
            tables,
            vec![
                "ai_operations",
                "api_sessions",
                "configuration_history",
                "system_configurations"
            ]
        );
    }

    #[tokio::test]
    async fn test_file_database_is_created_on_first_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("pulse.db");
        let pool = init_database_pool(&path).await.unwrap();
        assert!(path.exists());
        pool.close().await;

        // Reopen existing
        let pool = init_database_pool(&path).await.unwrap();
        pool.close().await;
    }
}
