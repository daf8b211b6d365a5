//! `SQLite` implementation of the permission rule repository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use toolgate_core::{
    NewPermissionRule, PermissionRepositoryError, PermissionRule, PermissionRuleRepository,
};

use super::row_mappers::{format_datetime, parse_datetime};

pub struct SqlitePermissionRuleRepository {
    pool: SqlitePool,
}

impl SqlitePermissionRuleRepository {
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct RuleRow {
    id: i64,
    server_id: Option<i64>,
    tool_name: Option<String>,
    tool_pattern: Option<String>,
    auto_approve: bool,
    priority: i64,
    created_at: String,
    updated_at: String,
}

impl From<RuleRow> for PermissionRule {
    fn from(row: RuleRow) -> Self {
        Self {
            id: row.id,
            server_id: row.server_id,
            tool_name: row.tool_name,
            tool_pattern: row.tool_pattern,
            auto_approve: row.auto_approve,
            priority: row.priority,
            created_at: parse_datetime(&row.created_at),
            updated_at: parse_datetime(&row.updated_at),
        }
    }
}

const RULE_COLUMNS: &str =
    "id, server_id, tool_name, tool_pattern, auto_approve, priority, created_at, updated_at";

fn storage_error(e: sqlx::Error) -> PermissionRepositoryError {
    PermissionRepositoryError::Internal(e.to_string())
}

#[async_trait]
impl PermissionRuleRepository for SqlitePermissionRuleRepository {
    async fn list(&self) -> Result<Vec<PermissionRule>, PermissionRepositoryError> {
        let rows = sqlx::query_as::<_, RuleRow>(&format!(
            "SELECT {RULE_COLUMNS} FROM permission_rules ORDER BY priority DESC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(rows.into_iter().map(PermissionRule::from).collect())
    }

    async fn get_by_id(&self, id: i64) -> Result<PermissionRule, PermissionRepositoryError> {
        sqlx::query_as::<_, RuleRow>(&format!(
            "SELECT {RULE_COLUMNS} FROM permission_rules WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?
        .map(PermissionRule::from)
        .ok_or(PermissionRepositoryError::NotFound(id))
    }

    async fn insert(
        &self,
        rule: NewPermissionRule,
    ) -> Result<PermissionRule, PermissionRepositoryError> {
        let now = format_datetime(&Utc::now());
        let result = sqlx::query(
            r#"
            INSERT INTO permission_rules (server_id, tool_name, tool_pattern, auto_approve, priority, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(rule.server_id)
        .bind(&rule.tool_name)
        .bind(&rule.tool_pattern)
        .bind(rule.auto_approve)
        .bind(rule.priority)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        self.get_by_id(result.last_insert_rowid()).await
    }

    async fn update(&self, rule: &PermissionRule) -> Result<(), PermissionRepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE permission_rules
            SET server_id = ?, tool_name = ?, tool_pattern = ?, auto_approve = ?, priority = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(rule.server_id)
        .bind(&rule.tool_name)
        .bind(&rule.tool_pattern)
        .bind(rule.auto_approve)
        .bind(rule.priority)
        .bind(format_datetime(&rule.updated_at))
        .bind(rule.id)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Err(PermissionRepositoryError::NotFound(rule.id));
        }
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), PermissionRepositoryError> {
        let result = sqlx::query("DELETE FROM permission_rules WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Err(PermissionRepositoryError::NotFound(id));
        }
        Ok(())
    }

    async fn delete_all(&self) -> Result<u64, PermissionRepositoryError> {
        let result = sqlx::query("DELETE FROM permission_rules")
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::setup_test_database;

    async fn repo() -> SqlitePermissionRuleRepository {
        SqlitePermissionRuleRepository::new(setup_test_database().await.unwrap())
    }

    #[tokio::test]
    async fn test_list_orders_by_priority_then_insertion() {
        let repo = repo().await;
        let low = repo.insert(NewPermissionRule::global(true)).await.unwrap();
        let high = repo
            .insert(NewPermissionRule::for_tool("rm", false).with_priority(10))
            .await
            .unwrap();
        let tie = repo
            .insert(NewPermissionRule::for_pattern("git_*", true))
            .await
            .unwrap();

        let ids: Vec<i64> = repo.list().await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![high.id, low.id, tie.id]);
    }

    #[tokio::test]
    async fn test_insert_round_trips_fields() {
        let repo = repo().await;
        let rule = repo
            .insert(NewPermissionRule::for_pattern("delete_*", false).on_server(4).with_priority(-2))
            .await
            .unwrap();

        let fetched = repo.get_by_id(rule.id).await.unwrap();
        assert_eq!(fetched.server_id, Some(4));
        assert_eq!(fetched.tool_name, None);
        assert_eq!(fetched.tool_pattern.as_deref(), Some("delete_*"));
        assert!(!fetched.auto_approve);
        assert_eq!(fetched.priority, -2);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let repo = repo().await;
        let mut rule = repo.insert(NewPermissionRule::for_tool("a", true)).await.unwrap();

        rule.auto_approve = false;
        rule.priority = 3;
        repo.update(&rule).await.unwrap();
        let fetched = repo.get_by_id(rule.id).await.unwrap();
        assert!(!fetched.auto_approve);
        assert_eq!(fetched.priority, 3);

        repo.delete(rule.id).await.unwrap();
        assert!(matches!(
            repo.get_by_id(rule.id).await,
            Err(PermissionRepositoryError::NotFound(_))
        ));
        assert!(matches!(
            repo.delete(rule.id).await,
            Err(PermissionRepositoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_all_counts() {
        let repo = repo().await;
        repo.insert(NewPermissionRule::global(true)).await.unwrap();
        repo.insert(NewPermissionRule::global(false)).await.unwrap();
        assert_eq!(repo.delete_all().await.unwrap(), 2);
        assert!(repo.list().await.unwrap().is_empty());
        assert_eq!(repo.delete_all().await.unwrap(), 0);
    }
}
