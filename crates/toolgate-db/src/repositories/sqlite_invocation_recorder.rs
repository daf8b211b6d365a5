//! `SQLite` sink for tool invocation outcomes.

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::warn;

use toolgate_core::{InvocationStatus, RecorderError, ToolInvocationRecord, ToolInvocationRecorder};

use super::row_mappers::{format_datetime, parse_datetime};

pub struct SqliteInvocationRecorder {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct InvocationRow {
    tool_call_id: String,
    session_id: String,
    server_id: Option<i64>,
    tool_name: String,
    status: String,
    output: Option<String>,
    error: Option<String>,
    latency_ms: i64,
    recorded_at: String,
}

impl SqliteInvocationRecorder {
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Most recent invocations first, optionally for one session.
    pub async fn recent(
        &self,
        session_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<ToolInvocationRecord>, RecorderError> {
        let rows = sqlx::query_as::<_, InvocationRow>(
            r#"
            SELECT tool_call_id, session_id, server_id, tool_name, status, output, error, latency_ms, recorded_at
            FROM tool_invocations
            WHERE ?1 IS NULL OR session_id = ?1
            ORDER BY id DESC
            LIMIT ?2
            "#,
        )
        .bind(session_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RecorderError(e.to_string()))?;

        Ok(rows.into_iter().filter_map(row_to_record).collect())
    }
}

fn row_to_record(row: InvocationRow) -> Option<ToolInvocationRecord> {
    let Some(status) = InvocationStatus::parse(&row.status) else {
        warn!(status = %row.status, "Skipping invocation with unknown status");
        return None;
    };
    Some(ToolInvocationRecord {
        tool_call_id: row.tool_call_id,
        session_id: row.session_id,
        server_id: row.server_id,
        tool_name: row.tool_name,
        status,
        output: row.output.and_then(|o| serde_json::from_str(&o).ok()),
        error: row.error,
        latency_ms: u64::try_from(row.latency_ms).unwrap_or_default(),
        recorded_at: parse_datetime(&row.recorded_at),
    })
}

#[async_trait]
impl ToolInvocationRecorder for SqliteInvocationRecorder {
    async fn record(&self, record: ToolInvocationRecord) -> Result<(), RecorderError> {
        let output = record
            .output
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RecorderError(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO tool_invocations (tool_call_id, session_id, server_id, tool_name, status, output, error, latency_ms, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.tool_call_id)
        .bind(&record.session_id)
        .bind(record.server_id)
        .bind(&record.tool_name)
        .bind(record.status.as_str())
        .bind(output)
        .bind(&record.error)
        .bind(i64::try_from(record.latency_ms).unwrap_or(i64::MAX))
        .bind(format_datetime(&record.recorded_at))
        .execute(&self.pool)
        .await
        .map_err(|e| RecorderError(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::setup_test_database;
    use chrono::Utc;
    use serde_json::json;

    fn record(session: &str, tool: &str, status: InvocationStatus) -> ToolInvocationRecord {
        ToolInvocationRecord {
            tool_call_id: format!("{tool}-call"),
            session_id: session.to_string(),
            server_id: Some(1),
            tool_name: tool.to_string(),
            status,
            output: (status == InvocationStatus::Success).then(|| json!([{"type": "text", "text": "ok"}])),
            error: (status != InvocationStatus::Success).then(|| "nope".to_string()),
            latency_ms: 42,
            recorded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_record_and_read_back() {
        let recorder = SqliteInvocationRecorder::new(setup_test_database().await.unwrap());
        recorder
            .record(record("s1", "read_file", InvocationStatus::Success))
            .await
            .unwrap();
        recorder
            .record(record("s1", "rm", InvocationStatus::Declined))
            .await
            .unwrap();
        recorder
            .record(record("s2", "ls", InvocationStatus::Error))
            .await
            .unwrap();

        let s1 = recorder.recent(Some("s1"), 10).await.unwrap();
        assert_eq!(s1.len(), 2);
        assert_eq!(s1[0].tool_name, "rm");
        assert_eq!(s1[0].status, InvocationStatus::Declined);
        assert_eq!(s1[1].output, Some(json!([{"type": "text", "text": "ok"}])));
        assert_eq!(s1[1].latency_ms, 42);

        assert_eq!(recorder.recent(None, 10).await.unwrap().len(), 3);
        assert_eq!(recorder.recent(None, 1).await.unwrap()[0].tool_name, "ls");
    }
}
