//! Stdio transport: one subprocess speaking line-delimited JSON-RPC.

use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::BufReader;
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinHandle;
use toolgate_core::{ProviderPrompt, ProviderResource, ProviderTool, ToolCallResult, ToolProvider};
use tracing::{debug, info};

use super::diagnostics::{DiagnosticBuffer, ExitReason};
use super::protocol::{RpcClient, read_line_lossy};
use super::{ConnectionError, ProviderConnection, StartFailure};

/// How long to wait for stderr to drain after the process is gone.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Everything needed to launch a provider process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub command: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub working_dir: Option<String>,
}

impl From<&ToolProvider> for LaunchSpec {
    fn from(provider: &ToolProvider) -> Self {
        Self {
            command: provider.command.clone(),
            args: provider.args.clone(),
            env: provider.env_pairs(),
            working_dir: provider.working_dir.clone(),
        }
    }
}

/// Live process state.
struct Session {
    rpc: Arc<RpcClient>,
    kill_tx: oneshot::Sender<()>,
    exit_watcher: JoinHandle<()>,
    stderr_reader: JoinHandle<()>,
}

impl Session {
    /// Close stdin, kill the child and wait for the exit watcher.
    async fn shutdown(self) {
        self.rpc.close().await;
        let _ = self.kill_tx.send(());
        if let Err(e) = self.exit_watcher.await {
            debug!(error = %e, "Exit watcher task failed");
        }
        drain_stderr(self.stderr_reader).await;
    }
}

/// Connection to a provider process over stdin/stdout.
pub struct StdioConnection {
    name: String,
    launch: LaunchSpec,
    request_timeout: Duration,
    call_timeout: Duration,
    diagnostics: Arc<DiagnosticBuffer>,
    exit_tx: Arc<watch::Sender<Option<ExitReason>>>,
    connected: AtomicBool,
    session: Mutex<Option<Session>>,
}

impl StdioConnection {
    pub fn new(
        name: impl Into<String>,
        launch: LaunchSpec,
        request_timeout: Duration,
        diagnostic_lines: usize,
    ) -> Self {
        let (exit_tx, _) = watch::channel(None);
        Self {
            name: name.into(),
            launch,
            request_timeout,
            call_timeout: request_timeout,
            diagnostics: Arc::new(DiagnosticBuffer::new(diagnostic_lines)),
            exit_tx: Arc::new(exit_tx),
            connected: AtomicBool::new(false),
            session: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    fn failure(&self, error: ConnectionError) -> StartFailure {
        StartFailure {
            error,
            diagnostics: self.diagnostics(),
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.launch.command);
        command
            .args(&self.launch.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in &self.launch.env {
            command.env(key, value);
        }
        if let Some(dir) = &self.launch.working_dir {
            command.current_dir(dir);
        }
        command
    }

    async fn rpc(&self) -> Result<Arc<RpcClient>, ConnectionError> {
        let session = self.session.lock().await;
        match session.as_ref() {
            Some(s) if self.is_running() && !s.rpc.is_closed() => Ok(s.rpc.clone()),
            _ => Err(ConnectionError::NotRunning),
        }
    }
}

#[async_trait]
impl ProviderConnection for StdioConnection {
    async fn start(&self) -> Result<(), StartFailure> {
        let mut slot = self.session.lock().await;
        if slot.is_some() && self.is_running() {
            return Ok(());
        }
        if let Some(stale) = slot.take() {
            stale.shutdown().await;
        }

        self.connected.store(false, Ordering::SeqCst);
        self.diagnostics.clear();
        self.exit_tx.send_replace(None);

        let mut child = match self.command().spawn() {
            Ok(child) => child,
            Err(e) => {
                let message = format!("failed to spawn '{}': {e}", self.launch.command);
                self.exit_tx
                    .send_replace(Some(ExitReason::launch_error(message.clone())));
                return Err(self.failure(ConnectionError::Spawn(message)));
            }
        };

        // Dropping `child` on these paths kills it (kill_on_drop).
        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(self.failure(ConnectionError::Spawn(
                "child stdio pipes unavailable".to_string(),
            )));
        };

        debug!(provider = %self.name, pid = ?child.id(), "Spawned tool provider");

        let stderr_reader = tokio::spawn(capture_stderr(
            stderr,
            self.diagnostics.clone(),
            self.name.clone(),
        ));
        let rpc = Arc::new(
            RpcClient::spawn(stdin, stdout, self.request_timeout)
                .with_call_timeout(self.call_timeout),
        );
        let (kill_tx, kill_rx) = oneshot::channel();
        let exit_watcher = tokio::spawn(watch_exit(child, kill_rx, self.exit_tx.clone()));

        let session = Session {
            rpc: rpc.clone(),
            kill_tx,
            exit_watcher,
            stderr_reader,
        };

        match rpc.initialize().await {
            Ok(_) => {
                self.connected.store(true, Ordering::SeqCst);
                *slot = Some(session);
                info!(provider = %self.name, "Tool provider connected");
                Ok(())
            }
            Err(error) => {
                session.shutdown().await;
                Err(self.failure(error))
            }
        }
    }

    async fn stop(&self) {
        let session = self.session.lock().await.take();
        self.connected.store(false, Ordering::SeqCst);
        if let Some(session) = session {
            session.shutdown().await;
            debug!(provider = %self.name, "Tool provider stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.exit_tx.borrow().is_none()
    }

    async fn list_tools(&self) -> Result<Vec<ProviderTool>, ConnectionError> {
        self.rpc().await?.list_tools().await
    }

    async fn list_resources(&self) -> Result<Vec<ProviderResource>, ConnectionError> {
        self.rpc().await?.list_resources().await
    }

    async fn list_prompts(&self) -> Result<Vec<ProviderPrompt>, ConnectionError> {
        self.rpc().await?.list_prompts().await
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<ToolCallResult, ConnectionError> {
        self.rpc().await?.call_tool(name, arguments).await
    }

    fn diagnostics(&self) -> String {
        let exit = self.exit_tx.borrow().clone();
        self.diagnostics.render(exit.as_ref())
    }

    fn exit_signal(&self) -> watch::Receiver<Option<ExitReason>> {
        self.exit_tx.subscribe()
    }
}

async fn capture_stderr(stderr: ChildStderr, buffer: Arc<DiagnosticBuffer>, provider: String) {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    while let Ok(Some(line)) = read_line_lossy(&mut reader, &mut buf).await {
        debug!(provider = %provider, "stderr: {line}");
        buffer.push(line);
    }
}

async fn drain_stderr(mut reader: JoinHandle<()>) {
    // Grandchildren may keep the pipe open after the child is gone.
    if tokio::time::timeout(STDERR_DRAIN_TIMEOUT, &mut reader)
        .await
        .is_err()
    {
        reader.abort();
    }
}

async fn watch_exit(
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    exit_tx: Arc<watch::Sender<Option<ExitReason>>>,
) {
    let natural = tokio::select! {
        biased;
        status = child.wait() => Some(status),
        _ = kill_rx => None,
    };

    let status = match natural {
        Some(status) => status,
        None => {
            if let Err(e) = child.start_kill() {
                debug!(error = %e, "Failed to signal tool provider");
            }
            child.wait().await
        }
    };

    let reason = match status {
        Ok(status) => ExitReason::from(status),
        Err(e) => {
            debug!(error = %e, "Failed to collect tool provider exit status");
            ExitReason::Unknown
        }
    };
    exit_tx.send_replace(Some(reason));
}
