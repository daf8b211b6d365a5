//! `SQLite` implementation of the tool provider repository.
//!
//! Environment variables live in a separate table with base64 encoding
//! (not encryption).

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction};

use toolgate_core::{
    NewToolProvider, ProviderEnvEntry, ProviderRepositoryError, ToolProvider,
    ToolProviderRepository,
};

use super::row_mappers::{decode_env_value, encode_env_value, format_datetime, parse_datetime};

/// `SQLite` implementation of the tool provider repository.
pub struct SqliteProviderRepository {
    pool: SqlitePool,
}

impl SqliteProviderRepository {
    /// Create a new `SQLite` provider repository.
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal row types for database queries
// ─────────────────────────────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct ProviderRow {
    id: i64,
    name: String,
    command: String,
    args: String,
    working_dir: Option<String>,
    enabled: bool,
    include_resources: bool,
    created_at: String,
    updated_at: String,
}

#[derive(sqlx::FromRow)]
struct EnvRow {
    key: String,
    value: String,
}

const PROVIDER_COLUMNS: &str =
    "id, name, command, args, working_dir, enabled, include_resources, created_at, updated_at";

fn row_to_provider(row: ProviderRow, env: Vec<ProviderEnvEntry>) -> ToolProvider {
    ToolProvider {
        id: row.id,
        name: row.name,
        command: row.command,
        args: serde_json::from_str(&row.args).unwrap_or_default(),
        env,
        working_dir: row.working_dir,
        enabled: row.enabled,
        include_resources: row.include_resources,
        created_at: parse_datetime(&row.created_at),
        updated_at: parse_datetime(&row.updated_at),
    }
}

/// Map `SQLx` errors to `ProviderRepositoryError`.
fn map_sqlx_error(e: sqlx::Error) -> ProviderRepositoryError {
    let msg = e.to_string();
    if msg.contains("UNIQUE constraint failed") && msg.contains("tool_providers.name") {
        return ProviderRepositoryError::Conflict("Tool provider name already exists".to_string());
    }
    ProviderRepositoryError::Internal(msg)
}

fn args_json(args: &[String]) -> Result<String, ProviderRepositoryError> {
    serde_json::to_string(args).map_err(|e| ProviderRepositoryError::Internal(e.to_string()))
}

async fn insert_env(
    tx: &mut Transaction<'_, Sqlite>,
    provider_id: i64,
    env: &[ProviderEnvEntry],
) -> Result<(), ProviderRepositoryError> {
    for entry in env {
        sqlx::query("INSERT INTO tool_provider_env (provider_id, key, value) VALUES (?, ?, ?)")
            .bind(provider_id)
            .bind(&entry.key)
            .bind(encode_env_value(&entry.value))
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Repository implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl ToolProviderRepository for SqliteProviderRepository {
    async fn insert(&self, provider: NewToolProvider) -> Result<ToolProvider, ProviderRepositoryError> {
        let now = format_datetime(&Utc::now());
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let result = sqlx::query(
            r#"
            INSERT INTO tool_providers (name, command, args, working_dir, enabled, include_resources, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&provider.name)
        .bind(&provider.command)
        .bind(args_json(&provider.args)?)
        .bind(&provider.working_dir)
        .bind(provider.enabled)
        .bind(provider.include_resources)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let id = result.last_insert_rowid();
        insert_env(&mut tx, id, &provider.env).await?;
        tx.commit().await.map_err(map_sqlx_error)?;

        self.get_by_id(id).await
    }

    async fn get_by_id(&self, id: i64) -> Result<ToolProvider, ProviderRepositoryError> {
        let row = sqlx::query_as::<_, ProviderRow>(&format!(
            "SELECT {PROVIDER_COLUMNS} FROM tool_providers WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .ok_or_else(|| ProviderRepositoryError::NotFound(id.to_string()))?;

        let env = self.fetch_env(id).await?;
        Ok(row_to_provider(row, env))
    }

    async fn get_by_name(&self, name: &str) -> Result<ToolProvider, ProviderRepositoryError> {
        let row = sqlx::query_as::<_, ProviderRow>(&format!(
            "SELECT {PROVIDER_COLUMNS} FROM tool_providers WHERE name = ?"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .ok_or_else(|| ProviderRepositoryError::NotFound(name.to_string()))?;

        let env = self.fetch_env(row.id).await?;
        Ok(row_to_provider(row, env))
    }

    async fn list(&self) -> Result<Vec<ToolProvider>, ProviderRepositoryError> {
        let rows = sqlx::query_as::<_, ProviderRow>(&format!(
            "SELECT {PROVIDER_COLUMNS} FROM tool_providers ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let mut providers = Vec::with_capacity(rows.len());
        for row in rows {
            let env = self.fetch_env(row.id).await?;
            providers.push(row_to_provider(row, env));
        }
        Ok(providers)
    }

    async fn update(&self, provider: &ToolProvider) -> Result<(), ProviderRepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let result = sqlx::query(
            r#"
            UPDATE tool_providers
            SET name = ?, command = ?, args = ?, working_dir = ?, enabled = ?, include_resources = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&provider.name)
        .bind(&provider.command)
        .bind(args_json(&provider.args)?)
        .bind(&provider.working_dir)
        .bind(provider.enabled)
        .bind(provider.include_resources)
        .bind(format_datetime(&provider.updated_at))
        .bind(provider.id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(ProviderRepositoryError::NotFound(provider.id.to_string()));
        }

        // Env is replaced wholesale
        sqlx::query("DELETE FROM tool_provider_env WHERE provider_id = ?")
            .bind(provider.id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        insert_env(&mut tx, provider.id, &provider.env).await?;

        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn delete(&self, id: i64) -> Result<(), ProviderRepositoryError> {
        // Env rows go with ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM tool_providers WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(ProviderRepositoryError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

impl SqliteProviderRepository {
    /// Fetch and decode environment variables for a provider.
    async fn fetch_env(&self, provider_id: i64) -> Result<Vec<ProviderEnvEntry>, ProviderRepositoryError> {
        let rows = sqlx::query_as::<_, EnvRow>(
            "SELECT key, value FROM tool_provider_env WHERE provider_id = ? ORDER BY id",
        )
        .bind(provider_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(|row| {
                decode_env_value(&row.value)
                    .map(|value| ProviderEnvEntry::new(row.key, value))
                    .map_err(ProviderRepositoryError::Internal)
            })
            .collect()
    }
}
