//! Sink for tool invocation outcomes.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::invocation::ToolInvocationRecord;

#[derive(Debug, Error)]
#[error("Failed to record tool invocation: {0}")]
pub struct RecorderError(pub String);

/// Persistence port receiving the outcome of every executed tool call.
#[async_trait]
pub trait ToolInvocationRecorder: Send + Sync {
    async fn record(&self, record: ToolInvocationRecord) -> Result<(), RecorderError>;
}

/// Recorder that drops every record (tests, one-shot CLI contexts).
#[derive(Debug, Clone, Default)]
pub struct NoopRecorder;

#[async_trait]
impl ToolInvocationRecorder for NoopRecorder {
    async fn record(&self, _record: ToolInvocationRecord) -> Result<(), RecorderError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::InvocationStatus;

    #[tokio::test]
    async fn test_noop_recorder_accepts_records() {
        let recorder: std::sync::Arc<dyn ToolInvocationRecorder> = std::sync::Arc::new(NoopRecorder);
        let record = ToolInvocationRecord {
            tool_call_id: "call-1".to_string(),
            session_id: "session".to_string(),
            server_id: Some(1),
            tool_name: "read_file".to_string(),
            status: InvocationStatus::Success,
            output: None,
            error: None,
            latency_ms: 3,
            recorded_at: chrono::Utc::now(),
        };
        assert!(recorder.record(record).await.is_ok());
    }
}
