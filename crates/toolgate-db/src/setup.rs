//! Database setup and initialization.
//!
//! Entry points call [`setup_database`] with the resolved database path
//! (see `toolgate_core::paths::database_path`).

use anyhow::Result;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use tracing::debug;

/// Open (creating if needed) the `SQLite` database and ensure the schema exists.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or created, or if schema
/// creation fails.
///
/// # Example
///
/// ```rust,no_run
/// use toolgate_db::setup_database;
/// use std::path::Path;
///
/// # async fn example() -> anyhow::Result<()> {
/// let pool = setup_database(Path::new("/path/to/toolgate.db")).await?;
/// # Ok(())
/// # }
/// ```
pub async fn setup_database(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let pool = SqlitePool::connect_with(
        SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true),
    )
    .await?;

    create_schema(&pool).await?;
    debug!(path = %db_path.display(), "Database ready");

    Ok(pool)
}

/// Sets up an in-memory `SQLite` database for testing.
///
/// The pool holds a single connection: every connection to `:memory:` is
/// its own database.
#[cfg(any(test, feature = "test-utils"))]
pub async fn setup_test_database() -> Result<SqlitePool> {
    let options: SqliteConnectOptions = "sqlite::memory:".parse()?;
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options.foreign_keys(true))
        .await?;
    create_schema(&pool).await?;
    Ok(pool)
}

/// Creates the complete database schema.
///
/// Safe to call multiple times; every statement uses IF NOT EXISTS.
async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tool_providers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            command TEXT NOT NULL,
            args TEXT NOT NULL DEFAULT '[]',
            working_dir TEXT,
            enabled INTEGER NOT NULL DEFAULT 1,
            include_resources INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Values are base64-encoded
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tool_provider_env (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            provider_id INTEGER NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            FOREIGN KEY (provider_id) REFERENCES tool_providers(id) ON DELETE CASCADE,
            UNIQUE(provider_id, key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_tool_provider_env_provider ON tool_provider_env(provider_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS permission_rules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            server_id INTEGER,
            tool_name TEXT,
            tool_pattern TEXT,
            auto_approve INTEGER NOT NULL,
            priority INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            CHECK (tool_name IS NULL OR tool_pattern IS NULL)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_permission_rules_priority ON permission_rules(priority DESC, id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tool_invocations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tool_call_id TEXT NOT NULL,
            session_id TEXT NOT NULL,
            server_id INTEGER,
            tool_name TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('success', 'error', 'declined', 'cancelled')),
            output TEXT,
            error TEXT,
            latency_ms INTEGER NOT NULL,
            recorded_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_tool_invocations_session ON tool_invocations(session_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
