//! Tool execution adapter for the agent loop.
//!
//! [`ToolExecutor`] ties the other components together: it resolves a
//! catalog name to a provider, asks the permission engine, suspends on the
//! approval coordinator when needed, calls the provider and records the
//! outcome.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use toolgate_core::{
    ApprovalContext, InvocationStatus, ProviderServiceError, ToolCatalogEntry,
    ToolInvocationRecord, ToolInvocationRecorder,
};
use tracing::{debug, info, warn};

use crate::approval::ApprovalCoordinator;
use crate::manager::ProcessManager;
use crate::permissions::PermissionEngine;

/// One tool call requested by the agent loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    /// Catalog key, as returned by `ProcessManager::get_all_tools`.
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
    pub session_id: String,
    #[serde(default)]
    pub stream_id: String,
    #[serde(default)]
    pub tool_call_id: String,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value, session_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments,
            session_id: session_id.into(),
            stream_id: String::new(),
            tool_call_id: String::new(),
        }
    }

    #[must_use]
    pub fn with_ids(mut self, stream_id: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        self.stream_id = stream_id.into();
        self.tool_call_id = tool_call_id.into();
        self
    }
}

/// Successful tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolExecution {
    pub server_id: i64,
    /// Provider-side tool name.
    pub tool_name: String,
    pub output: Value,
    /// `true` when a rule let the call through without asking.
    pub auto_approved: bool,
    pub latency_ms: u64,
}

/// Errors from [`ToolExecutor::execute`].
#[derive(Debug, Error)]
pub enum ToolExecutionError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool call declined: {}", reason.as_deref().unwrap_or("no reason given"))]
    Declined { reason: Option<String> },

    #[error(transparent)]
    Provider(#[from] ProviderServiceError),

    /// The provider ran the tool and reported a failure.
    #[error("Tool reported an error: {0}")]
    ToolFault(String),

    #[error("Tool call cancelled")]
    Cancelled,
}

impl ToolExecutionError {
    const fn status(&self) -> InvocationStatus {
        match self {
            Self::Declined { .. } => InvocationStatus::Declined,
            Self::Cancelled => InvocationStatus::Cancelled,
            Self::UnknownTool(_) | Self::Provider(_) | Self::ToolFault(_) => {
                InvocationStatus::Error
            }
        }
    }
}

/// Runs agent tool calls through permission, approval and the provider.
#[derive(Clone)]
pub struct ToolExecutor {
    manager: ProcessManager,
    permissions: Arc<PermissionEngine>,
    approvals: ApprovalCoordinator,
    recorder: Arc<dyn ToolInvocationRecorder>,
}

impl ToolExecutor {
    pub fn new(
        manager: ProcessManager,
        permissions: Arc<PermissionEngine>,
        approvals: ApprovalCoordinator,
        recorder: Arc<dyn ToolInvocationRecorder>,
    ) -> Self {
        Self {
            manager,
            permissions,
            approvals,
            recorder,
        }
    }

    pub async fn execute(&self, call: ToolCall) -> Result<ToolExecution, ToolExecutionError> {
        self.execute_with_cancel(call, CancellationToken::new()).await
    }

    /// Execute a call that can be cancelled while the provider runs it.
    ///
    /// A pending approval is not cancellable through `token`; it ends by
    /// decision or timeout. Cancellation observed afterwards skips or aborts
    /// the provider call.
    pub async fn execute_with_cancel(
        &self,
        call: ToolCall,
        token: CancellationToken,
    ) -> Result<ToolExecution, ToolExecutionError> {
        let started = Instant::now();
        let entry = self.manager.resolve_tool(&call.name).await;

        let result = match &entry {
            Some(entry) => self.run(&call, entry, &token, started).await,
            None => Err(ToolExecutionError::UnknownTool(call.name.clone())),
        };

        self.record(&call, entry.as_ref(), &result, started).await;
        result
    }

    async fn run(
        &self,
        call: &ToolCall,
        entry: &ToolCatalogEntry,
        token: &CancellationToken,
        started: Instant,
    ) -> Result<ToolExecution, ToolExecutionError> {
        let server_id = entry.server_id;
        let tool_name = entry.tool.name.as_str();

        let auto_approved = self
            .permissions
            .should_auto_approve(server_id, tool_name)
            .await;

        if auto_approved {
            debug!(server_id, tool = tool_name, "Tool call auto-approved");
        } else {
            let context = ApprovalContext::new(
                call.session_id.clone(),
                call.stream_id.clone(),
                call.tool_call_id.clone(),
                call.name.clone(),
                call.arguments.clone(),
            )
            .with_server(server_id);

            let decision = self.approvals.request_approval(context).await;
            if !decision.approved {
                return Err(ToolExecutionError::Declined {
                    reason: decision.reason,
                });
            }
        }

        if token.is_cancelled() {
            return Err(ToolExecutionError::Cancelled);
        }

        let result = tokio::select! {
            biased;
            () = token.cancelled() => return Err(ToolExecutionError::Cancelled),
            result = self.manager.call_tool(server_id, tool_name, call.arguments.clone()) => result?,
        };

        if !result.success {
            return Err(ToolExecutionError::ToolFault(
                result
                    .error
                    .unwrap_or_else(|| "tool failed without a message".to_string()),
            ));
        }

        Ok(ToolExecution {
            server_id,
            tool_name: tool_name.to_string(),
            output: result.data.unwrap_or(Value::Null),
            auto_approved,
            latency_ms: elapsed_ms(started),
        })
    }

    async fn record(
        &self,
        call: &ToolCall,
        entry: Option<&ToolCatalogEntry>,
        result: &Result<ToolExecution, ToolExecutionError>,
        started: Instant,
    ) {
        let (status, output, error) = match result {
            Ok(execution) => (
                InvocationStatus::Success,
                Some(execution.output.clone()),
                None,
            ),
            Err(e) => (e.status(), None, Some(e.to_string())),
        };

        info!(
            tool = %call.name,
            session_id = %call.session_id,
            status = status.as_str(),
            "Tool call finished"
        );

        let record = ToolInvocationRecord {
            tool_call_id: call.tool_call_id.clone(),
            session_id: call.session_id.clone(),
            server_id: entry.map(|e| e.server_id),
            tool_name: call.name.clone(),
            status,
            output,
            error,
            latency_ms: elapsed_ms(started),
            recorded_at: chrono::Utc::now(),
        };

        if let Err(e) = self.recorder.record(record).await {
            warn!(tool = %call.name, error = %e, "Failed to record tool invocation");
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        MockFactory, MockProviderRepository, MockRuleRepository, RecordingRecorder, Script,
    };
    use serde_json::json;
    use std::time::Duration;
    use toolgate_core::{NewPermissionRule, NewToolProvider, NoopEmitter, APPROVAL_TIMEOUT_REASON};

    struct Fixture {
        executor: ToolExecutor,
        manager: ProcessManager,
        permissions: Arc<PermissionEngine>,
        approvals: ApprovalCoordinator,
        factory: Arc<MockFactory>,
        recorder: Arc<RecordingRecorder>,
    }

    async fn fixture() -> Fixture {
        let factory = Arc::new(MockFactory::new());
        factory.script("fs", Script::tools(&["read_file", "write_file", "boom", "slow"]));
        let manager = ProcessManager::new(
            Arc::new(MockProviderRepository::new()),
            factory.clone(),
            Arc::new(NoopEmitter::new()),
        );
        manager
            .add_config(NewToolProvider::new("fs", "fs", vec![]))
            .await
            .unwrap();

        let permissions = Arc::new(PermissionEngine::new(
            Arc::new(MockRuleRepository::new()),
            Duration::from_secs(5),
        ));
        let approvals = ApprovalCoordinator::new(Arc::new(NoopEmitter::new()), Duration::from_secs(300));
        let recorder = Arc::new(RecordingRecorder::default());
        let executor = ToolExecutor::new(
            manager.clone(),
            permissions.clone(),
            approvals.clone(),
            recorder.clone(),
        );
        Fixture {
            executor,
            manager,
            permissions,
            approvals,
            factory,
            recorder,
        }
    }

    fn call(name: &str) -> ToolCall {
        ToolCall::new(name, json!({"path": "/tmp/a"}), "session-1").with_ids("stream-1", "call-1")
    }

    fn statuses(recorder: &RecordingRecorder) -> Vec<InvocationStatus> {
        recorder
            .records
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.status)
            .collect()
    }

    #[tokio::test]
    async fn test_auto_approved_call_runs_without_asking() {
        let fx = fixture().await;
        fx.permissions
            .create_rule(NewPermissionRule::for_tool("read_file", true))
            .await
            .unwrap();

        let execution = fx.executor.execute(call("read_file")).await.unwrap();
        assert!(execution.auto_approved);
        assert_eq!(execution.tool_name, "read_file");
        assert_eq!(fx.approvals.pending_count(), 0);
        assert_eq!(statuses(&fx.recorder), vec![InvocationStatus::Success]);

        let record = fx.recorder.records.lock().unwrap()[0].clone();
        assert_eq!(record.tool_call_id, "call-1");
        assert_eq!(record.server_id, Some(1));
    }

    #[tokio::test]
    async fn test_approved_call_runs() {
        let fx = fixture().await;
        let mut events = fx.approvals.subscribe();

        let approvals = fx.approvals.clone();
        let approver = tokio::spawn(async move {
            if let Some(toolgate_core::ApprovalEvent::Requested { request }) = events.recv().await {
                assert_eq!(request.context.tool_name, "write_file");
                assert_eq!(request.context.server_id, Some(1));
                approvals.approve(request.id);
            }
        });

        let execution = fx.executor.execute(call("write_file")).await.unwrap();
        approver.await.unwrap();
        assert!(!execution.auto_approved);

        let conn = fx.factory.latest(1).unwrap();
        assert_eq!(conn.calls.lock().unwrap()[0].0, "write_file");
    }

    #[tokio::test]
    async fn test_declined_call_never_reaches_provider() {
        let fx = fixture().await;
        let mut events = fx.approvals.subscribe();
        let approvals = fx.approvals.clone();
        tokio::spawn(async move {
            if let Some(event) = events.recv().await {
                approvals.decline(event.request_id(), "user said no");
            }
        });

        let err = fx.executor.execute(call("write_file")).await.unwrap_err();
        assert!(matches!(
            err,
            ToolExecutionError::Declined { reason: Some(ref r) } if r == "user said no"
        ));
        assert!(fx.factory.latest(1).unwrap().calls.lock().unwrap().is_empty());
        assert_eq!(statuses(&fx.recorder), vec![InvocationStatus::Declined]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_approval_timeout_declines() {
        let fx = fixture().await;
        let err = fx.executor.execute(call("write_file")).await.unwrap_err();
        assert!(matches!(
            err,
            ToolExecutionError::Declined { reason: Some(ref r) } if r == APPROVAL_TIMEOUT_REASON
        ));
        assert!(fx.factory.latest(1).unwrap().calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_tool_is_recorded() {
        let fx = fixture().await;
        let err = fx.executor.execute(call("nope")).await.unwrap_err();
        assert!(matches!(err, ToolExecutionError::UnknownTool(ref n) if n == "nope"));

        let records = fx.recorder.records.lock().unwrap();
        assert_eq!(records[0].status, InvocationStatus::Error);
        assert_eq!(records[0].server_id, None);
    }

    #[tokio::test]
    async fn test_provider_reported_error_becomes_tool_fault() {
        let fx = fixture().await;
        fx.permissions
            .create_rule(NewPermissionRule::global(true))
            .await
            .unwrap();

        let err = fx.executor.execute(call("boom")).await.unwrap_err();
        assert!(matches!(err, ToolExecutionError::ToolFault(ref m) if m == "tool exploded"));
        assert_eq!(statuses(&fx.recorder), vec![InvocationStatus::Error]);
    }

    #[tokio::test]
    async fn test_stopped_provider_surfaces_as_unknown_tool() {
        let fx = fixture().await;
        fx.permissions
            .create_rule(NewPermissionRule::global(true))
            .await
            .unwrap();
        fx.manager.stop(1).await.unwrap();

        let err = fx.executor.execute(call("read_file")).await.unwrap_err();
        assert!(matches!(err, ToolExecutionError::UnknownTool(_)));
    }

    #[tokio::test]
    async fn test_namespaced_call_routes_after_sibling_crash() {
        let fx = fixture().await;
        fx.factory.script("fs-mirror", Script::tools(&["read_file"]));
        fx.manager
            .add_config(NewToolProvider::new("mirror", "fs-mirror", vec![]))
            .await
            .unwrap();
        fx.permissions
            .create_rule(NewPermissionRule::global(true))
            .await
            .unwrap();

        let catalog = fx.manager.get_all_tools().await;
        assert!(catalog.contains_key("read_file__1"));
        assert!(catalog.contains_key("read_file__2"));

        fx.factory.latest(2).unwrap().crash(1);
        for _ in 0..100 {
            if fx.manager.get_status(2).is_some_and(|s| !s.is_connected()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let execution = fx.executor.execute(call("read_file__1")).await.unwrap();
        assert_eq!(execution.tool_name, "read_file");
        let conn = fx.factory.latest(1).unwrap();
        assert_eq!(conn.calls.lock().unwrap()[0].0, "read_file");

        let err = fx.executor.execute(call("read_file__2")).await.unwrap_err();
        assert!(matches!(err, ToolExecutionError::UnknownTool(ref n) if n == "read_file__2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_aborts_in_flight_call() {
        let fx = fixture().await;
        fx.permissions
            .create_rule(NewPermissionRule::global(true))
            .await
            .unwrap();

        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            cancel.cancel();
        });

        let err = fx
            .executor
            .execute_with_cancel(call("slow"), token)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolExecutionError::Cancelled));
        assert_eq!(statuses(&fx.recorder), vec![InvocationStatus::Cancelled]);
    }

    #[tokio::test]
    async fn test_cancelled_before_call_skips_provider() {
        let fx = fixture().await;
        fx.permissions
            .create_rule(NewPermissionRule::global(true))
            .await
            .unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let err = fx
            .executor
            .execute_with_cancel(call("read_file"), token)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolExecutionError::Cancelled));
        assert!(fx.factory.latest(1).unwrap().calls.lock().unwrap().is_empty());
    }
}
