//! Tool-provider connections.
//!
//! A connection is the in-process handle to one provider process: it owns
//! the subprocess, the protocol session and the diagnostic capture. The
//! process manager only talks to connections through [`ProviderConnection`],
//! so tests can substitute scripted implementations.

mod diagnostics;
mod protocol;
mod stdio;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use toolgate_core::{
    ControlPlaneSettings, ProviderPrompt, ProviderResource, ProviderTool, ToolCallResult,
    ToolProvider,
};

pub use diagnostics::{DiagnosticBuffer, ExitReason};
pub use protocol::{InitializeResult, PROTOCOL_VERSION, RpcClient, ServerCapabilities, ServerInfo};
pub use stdio::{LaunchSpec, StdioConnection};

/// Errors raised by a connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Failed to spawn tool provider process: {0}")]
    Spawn(String),

    #[error("Failed to communicate with tool provider: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Tool provider returned error: code={code}, message={message}")]
    Server { code: i64, message: String },

    #[error("Timeout waiting for {method} response")]
    Timeout { method: String },

    #[error("Tool provider closed the connection")]
    Closed,

    #[error("Tool provider is not running")]
    NotRunning,
}

/// A failed `start()`, with whatever diagnostics were captured.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct StartFailure {
    pub error: ConnectionError,
    /// Stderr tail and exit reason; empty when nothing was captured.
    pub diagnostics: String,
}

/// Handle to one tool-provider process.
#[async_trait]
pub trait ProviderConnection: Send + Sync {
    /// Spawn the process and complete the handshake.
    ///
    /// Succeeds immediately if already running.
    async fn start(&self) -> Result<(), StartFailure>;

    /// Terminate the process. Stopping a non-running connection is a no-op.
    async fn stop(&self);

    fn is_running(&self) -> bool;

    async fn list_tools(&self) -> Result<Vec<ProviderTool>, ConnectionError>;

    async fn list_resources(&self) -> Result<Vec<ProviderResource>, ConnectionError>;

    async fn list_prompts(&self) -> Result<Vec<ProviderPrompt>, ConnectionError>;

    async fn call_tool(&self, name: &str, arguments: Value)
    -> Result<ToolCallResult, ConnectionError>;

    /// Rendered stderr tail plus exit reason.
    fn diagnostics(&self) -> String;

    /// Receiver that turns `Some` once the process has exited.
    fn exit_signal(&self) -> watch::Receiver<Option<ExitReason>>;
}

/// Builds connections for provider configurations.
pub trait ConnectionFactory: Send + Sync {
    fn create(&self, provider: &ToolProvider) -> Arc<dyn ProviderConnection>;
}

/// Factory producing [`StdioConnection`]s.
#[derive(Debug, Clone)]
pub struct StdioConnectionFactory {
    request_timeout: Duration,
    call_timeout: Duration,
    diagnostic_lines: usize,
}

impl StdioConnectionFactory {
    pub const fn new(request_timeout: Duration, diagnostic_lines: usize) -> Self {
        Self {
            request_timeout,
            call_timeout: request_timeout,
            diagnostic_lines,
        }
    }

    #[must_use]
    pub const fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub const fn from_settings(settings: &ControlPlaneSettings) -> Self {
        Self::new(
            settings.request_timeout(),
            settings.effective_diagnostic_lines(),
        )
        .with_call_timeout(settings.tool_call_timeout())
    }
}

impl Default for StdioConnectionFactory {
    fn default() -> Self {
        Self::from_settings(&ControlPlaneSettings::with_defaults())
    }
}

impl ConnectionFactory for StdioConnectionFactory {
    fn create(&self, provider: &ToolProvider) -> Arc<dyn ProviderConnection> {
        Arc::new(
            StdioConnection::new(
                provider.name.clone(),
                LaunchSpec::from(provider),
                self.request_timeout,
                self.diagnostic_lines,
            )
            .with_call_timeout(self.call_timeout),
        )
    }
}
