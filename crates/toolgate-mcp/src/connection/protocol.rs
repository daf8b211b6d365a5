//! JSON-RPC 2.0 client over a line-delimited byte stream.
//!
//! Requests are matched to responses by id through a pending map that the
//! reader task resolves. Lines that are not JSON-RPC (banners, npx progress
//! output) are skipped. When the stream closes every pending request fails.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use toolgate_core::{ProviderPrompt, ProviderResource, ProviderTool, ToolCallResult};
use tracing::debug;

use super::ConnectionError;

/// Protocol revision sent in the `initialize` request.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Upper bound on pages fetched for one list call.
const MAX_LIST_PAGES: usize = 64;

type Responder = oneshot::Sender<Result<Value, ConnectionError>>;
type PendingMap = Arc<Mutex<HashMap<u64, Responder>>>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// JSON-RPC 2.0 request or notification.
#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

/// Any inbound JSON-RPC message.
#[derive(Debug, Deserialize)]
struct JsonRpcMessage {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Result of the `initialize` handshake.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    #[serde(default)]
    pub protocol_version: Option<String>,
    #[serde(default)]
    pub server_info: Option<ServerInfo>,
    #[serde(default)]
    pub capabilities: ServerCapabilities,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// Capabilities advertised by the server. Absent means unsupported.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerCapabilities {
    #[serde(default)]
    pub tools: Option<Value>,
    #[serde(default)]
    pub resources: Option<Value>,
    #[serde(default)]
    pub prompts: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ToolSchema {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, rename = "inputSchema")]
    input_schema: Option<Value>,
}

impl From<ToolSchema> for ProviderTool {
    fn from(schema: ToolSchema) -> Self {
        Self {
            name: schema.name,
            description: schema.description,
            input_schema: schema.input_schema,
        }
    }
}

/// Client side of one JSON-RPC session.
pub struct RpcClient {
    writer: tokio::sync::Mutex<Option<BoxedWriter>>,
    pending: PendingMap,
    closed: Arc<AtomicBool>,
    next_id: AtomicU64,
    request_timeout: Duration,
    call_timeout: Duration,
    capabilities: OnceLock<ServerCapabilities>,
    reader_task: JoinHandle<()>,
}

impl RpcClient {
    /// Start a session over `writer`/`reader` and spawn the response loop.
    pub fn spawn<W, R>(writer: W, reader: R, request_timeout: Duration) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
    {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let reader_task = tokio::spawn(read_responses(reader, pending.clone(), closed.clone()));

        Self {
            writer: tokio::sync::Mutex::new(Some(Box::new(writer))),
            pending,
            closed,
            next_id: AtomicU64::new(1),
            request_timeout,
            call_timeout: request_timeout,
            capabilities: OnceLock::new(),
            reader_task,
        }
    }

    /// Bound `tools/call` separately from handshake and list requests.
    #[must_use]
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Whether the inbound stream has closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Send a request and wait for its response.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, ConnectionError> {
        self.request_within(method, params, self.request_timeout).await
    }

    async fn request_within(
        &self,
        method: &str,
        params: Option<Value>,
        limit: Duration,
    ) -> Result<Value, ConnectionError> {
        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending_map().insert(id, tx);

        // The reader may have drained the map between the check above and the insert.
        if self.is_closed() {
            self.pending_map().remove(&id);
            return Err(ConnectionError::Closed);
        }

        let message = JsonRpcRequest {
            jsonrpc: "2.0",
            id: Some(id),
            method,
            params,
        };
        if let Err(e) = self.write_message(&message).await {
            self.pending_map().remove(&id);
            return Err(e);
        }

        match timeout(limit, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ConnectionError::Closed),
            Err(_) => {
                self.pending_map().remove(&id);
                Err(ConnectionError::Timeout {
                    method: method.to_string(),
                })
            }
        }
    }

    /// Send a notification (no response expected).
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), ConnectionError> {
        let message = JsonRpcRequest {
            jsonrpc: "2.0",
            id: None,
            method,
            params,
        };
        self.write_message(&message).await
    }

    /// Perform the `initialize` handshake and record the server capabilities.
    pub async fn initialize(&self) -> Result<InitializeResult, ConnectionError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "clientInfo": {
                "name": "toolgate",
                "version": env!("CARGO_PKG_VERSION")
            },
            "capabilities": {}
        });

        let value = self.request("initialize", Some(params)).await?;
        let result: InitializeResult = serde_json::from_value(value)?;
        let _ = self.capabilities.set(result.capabilities.clone());

        self.notify("notifications/initialized", None).await?;

        if let Some(info) = &result.server_info {
            debug!(
                server = %info.name,
                version = info.version.as_deref().unwrap_or("unknown"),
                "Tool provider handshake complete"
            );
        }
        Ok(result)
    }

    pub async fn list_tools(&self) -> Result<Vec<ProviderTool>, ConnectionError> {
        if !self.supports(|c| c.tools.is_some()) {
            return Ok(Vec::new());
        }
        let schemas: Vec<ToolSchema> = self.list_paginated("tools/list", "tools").await?;
        Ok(schemas.into_iter().map(ProviderTool::from).collect())
    }

    pub async fn list_resources(&self) -> Result<Vec<ProviderResource>, ConnectionError> {
        if !self.supports(|c| c.resources.is_some()) {
            return Ok(Vec::new());
        }
        self.list_paginated("resources/list", "resources").await
    }

    pub async fn list_prompts(&self) -> Result<Vec<ProviderPrompt>, ConnectionError> {
        if !self.supports(|c| c.prompts.is_some()) {
            return Ok(Vec::new());
        }
        self.list_paginated("prompts/list", "prompts").await
    }

    /// Call a tool. A result flagged `isError` becomes `ToolCallResult::error`.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallResult, ConnectionError> {
        let arguments = if arguments.is_null() { json!({}) } else { arguments };
        let params = json!({
            "name": name,
            "arguments": arguments
        });

        let result = self
            .request_within("tools/call", Some(params), self.call_timeout)
            .await?;

        let content = result.get("content").cloned().unwrap_or_else(|| json!([]));
        let is_error = result
            .get("isError")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        if is_error {
            let message = content
                .as_array()
                .and_then(|items| items.first())
                .and_then(|item| item.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("Unknown error")
                .to_string();
            Ok(ToolCallResult::error(message))
        } else {
            Ok(ToolCallResult::success(content))
        }
    }

    /// Close the outbound stream (the provider sees EOF on stdin).
    pub async fn close(&self) {
        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                debug!(error = %e, "Error closing tool provider stdin");
            }
        }
    }

    async fn list_paginated<T>(&self, method: &str, key: &str) -> Result<Vec<T>, ConnectionError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_LIST_PAGES {
            let params = cursor.take().map(|c| json!({ "cursor": c }));
            let result = self.request(method, params).await?;

            let page = result.get(key).cloned().unwrap_or_else(|| json!([]));
            let mut page: Vec<T> = serde_json::from_value(page)?;
            items.append(&mut page);

            match result.get("nextCursor").and_then(Value::as_str) {
                Some(next) if !next.is_empty() => cursor = Some(next.to_string()),
                _ => return Ok(items),
            }
        }

        debug!(method, "Stopped paginating after page limit");
        Ok(items)
    }

    fn supports(&self, check: impl Fn(&ServerCapabilities) -> bool) -> bool {
        self.capabilities.get().is_some_and(check)
    }

    async fn write_message(&self, message: &JsonRpcRequest<'_>) -> Result<(), ConnectionError> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(ConnectionError::Closed)?;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    fn pending_map(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Responder>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

async fn read_responses<R>(reader: R, pending: PendingMap, closed: Arc<AtomicBool>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        match read_line_lossy(&mut reader, &mut buf).await {
            Ok(Some(line)) => dispatch(&pending, line.trim()),
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "Tool provider stdout read failed");
                break;
            }
        }
    }

    closed.store(true, Ordering::SeqCst);

    let drained: Vec<_> = pending
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .drain()
        .collect();
    if !drained.is_empty() {
        debug!(count = drained.len(), "Failing pending requests after stdout closed");
    }
    for (_, tx) in drained {
        let _ = tx.send(Err(ConnectionError::Closed));
    }
}

/// Read one newline-terminated line, replacing invalid UTF-8.
///
/// Returns `None` at end of stream. Provider output is not guaranteed to be
/// valid UTF-8 and a bad byte must not end the session.
pub(super) async fn read_line_lossy<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(buf);
    Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
}

fn dispatch(pending: &PendingMap, line: &str) {
    if line.is_empty() {
        return;
    }

    let Ok(message) = serde_json::from_str::<JsonRpcMessage>(line) else {
        debug!(line, "Skipping non-JSON-RPC output");
        return;
    };

    if let Some(method) = &message.method {
        debug!(method = %method, "Ignoring server-initiated message");
        return;
    }

    let Some(id) = message.id.as_ref().and_then(Value::as_u64) else {
        debug!(line, "Skipping response without numeric id");
        return;
    };

    let Some(tx) = pending
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&id)
    else {
        debug!(id, "Response for unknown or expired request");
        return;
    };

    let outcome = match message.error {
        Some(err) => Err(ConnectionError::Server {
            code: err.code,
            message: err.message,
        }),
        None => Ok(message.result.unwrap_or(Value::Null)),
    };
    if tx.send(outcome).is_err() {
        debug!(id, "Response receiver dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    /// Minimal scripted server answering on the far end of a duplex pipe.
    async fn fake_server(stream: DuplexStream, capabilities: Value) {
        let (read, mut write) = tokio::io::split(stream);
        let mut lines = BufReader::new(read).lines();
        write.write_all(b"starting up...\n").await.unwrap();

        while let Ok(Some(line)) = lines.next_line().await {
            let request: Value = serde_json::from_str(&line).unwrap();
            let Some(id) = request.get("id").cloned() else {
                continue;
            };
            let method = request["method"].as_str().unwrap_or_default();
            let response = match method {
                "initialize" => json!({
                    "jsonrpc": "2.0", "id": id,
                    "result": {
                        "protocolVersion": PROTOCOL_VERSION,
                        "serverInfo": { "name": "fake" },
                        "capabilities": capabilities.clone()
                    }
                }),
                "tools/list" if request.get("params").is_none() => json!({
                    "jsonrpc": "2.0", "id": id,
                    "result": { "tools": [{ "name": "read_file" }], "nextCursor": "p2" }
                }),
                "tools/list" => json!({
                    "jsonrpc": "2.0", "id": id,
                    "result": { "tools": [{ "name": "write_file", "description": "Write" }] }
                }),
                "tools/call" if request["params"]["name"] == "slow" => {
                    tokio::time::sleep(Duration::from_secs(120)).await;
                    json!({
                        "jsonrpc": "2.0", "id": id,
                        "result": { "content": [{ "type": "text", "text": "done" }] }
                    })
                }
                "tools/call" if request["params"]["name"] == "fail" => json!({
                    "jsonrpc": "2.0", "id": id,
                    "result": { "isError": true, "content": [{ "type": "text", "text": "denied" }] }
                }),
                "tools/call" => json!({
                    "jsonrpc": "2.0", "id": id,
                    "result": { "content": [{ "type": "text", "text": "ok" }] }
                }),
                "hang" => continue,
                _ => json!({
                    "jsonrpc": "2.0", "id": id,
                    "error": { "code": -32601, "message": "Method not found" }
                }),
            };
            let mut out = serde_json::to_string(&response).unwrap();
            out.push('\n');
            write.write_all(out.as_bytes()).await.unwrap();
        }
    }

    fn connect(capabilities: Value) -> RpcClient {
        let (client, server) = tokio::io::duplex(64 * 1024);
        tokio::spawn(fake_server(server, capabilities));
        let (read, write) = tokio::io::split(client);
        RpcClient::spawn(write, read, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_handshake_skips_noise_and_paginates_tools() {
        let client = connect(json!({ "tools": {} }));
        let init = client.initialize().await.unwrap();
        assert_eq!(init.server_info.unwrap().name, "fake");

        let tools = client.list_tools().await.unwrap();
        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["read_file", "write_file"]);
    }

    #[tokio::test]
    async fn test_unadvertised_capabilities_list_empty() {
        let client = connect(json!({ "tools": {} }));
        client.initialize().await.unwrap();
        assert!(client.list_resources().await.unwrap().is_empty());
        assert!(client.list_prompts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_call_tool_maps_is_error() {
        let client = connect(json!({ "tools": {} }));
        client.initialize().await.unwrap();

        let ok = client.call_tool("echo", Value::Null).await.unwrap();
        assert!(ok.success);

        let failed = client.call_tool("fail", json!({})).await.unwrap();
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("denied"));
    }

    #[tokio::test]
    async fn test_server_error_is_surfaced() {
        let client = connect(json!({}));
        let err = client.request("bogus", None).await.unwrap_err();
        assert!(matches!(err, ConnectionError::Server { code: -32601, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_times_out() {
        let (client_end, server) = tokio::io::duplex(1024);
        tokio::spawn(fake_server(server, json!({})));
        let (read, write) = tokio::io::split(client_end);
        let client = RpcClient::spawn(write, read, Duration::from_millis(50));

        let err = client.request("hang", None).await.unwrap_err();
        assert!(matches!(err, ConnectionError::Timeout { ref method } if method == "hang"));
        assert!(client.pending_map().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tool_call_uses_its_own_timeout() {
        let (client_end, server) = tokio::io::duplex(1024);
        tokio::spawn(fake_server(server, json!({ "tools": {} })));
        let (read, write) = tokio::io::split(client_end);
        let client = RpcClient::spawn(write, read, Duration::from_secs(30))
            .with_call_timeout(Duration::from_secs(600));
        client.initialize().await.unwrap();

        let result = client.call_tool("slow", json!({})).await.unwrap();
        assert!(result.success);
        assert_eq!(result.data, Some(json!([{ "type": "text", "text": "done" }])));

        let err = client.request("hang", None).await.unwrap_err();
        assert!(matches!(err, ConnectionError::Timeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tool_call_times_out_at_call_bound() {
        let (client_end, server) = tokio::io::duplex(1024);
        tokio::spawn(fake_server(server, json!({ "tools": {} })));
        let (read, write) = tokio::io::split(client_end);
        let client = RpcClient::spawn(write, read, Duration::from_secs(300))
            .with_call_timeout(Duration::from_secs(60));
        client.initialize().await.unwrap();

        let err = client.call_tool("slow", json!({})).await.unwrap_err();
        assert!(matches!(err, ConnectionError::Timeout { ref method } if method == "tools/call"));
    }

    #[tokio::test]
    async fn test_invalid_utf8_output_does_not_close_session() {
        let (client_end, server) = tokio::io::duplex(1024);
        let (read, write) = tokio::io::split(client_end);
        let client = RpcClient::spawn(write, read, Duration::from_secs(5));

        let server_task = tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(server);
            let mut lines = BufReader::new(read).lines();
            let line = lines.next_line().await.unwrap().unwrap();
            let request: Value = serde_json::from_str(&line).unwrap();

            write.write_all(b"caf\xe9 \xff\xfe progress\n").await.unwrap();
            let response = json!({ "jsonrpc": "2.0", "id": request["id"], "result": { "pong": true } });
            let mut out = serde_json::to_string(&response).unwrap();
            out.push('\n');
            write.write_all(out.as_bytes()).await.unwrap();
            // Hold the stream open until the client has read the answer.
            let _ = lines.next_line().await;
        });

        let result = client.request("ping", None).await.unwrap();
        assert_eq!(result, json!({ "pong": true }));
        assert!(!client.is_closed());
        drop(client);
        server_task.abort();
    }

    #[tokio::test]
    async fn test_pending_requests_fail_when_stream_closes() {
        let (client_end, server) = tokio::io::duplex(1024);
        let (read, write) = tokio::io::split(client_end);
        let client = RpcClient::spawn(write, read, Duration::from_secs(5));

        // Server reads the request, then hangs up without answering.
        let server_task = tokio::spawn(async move {
            let (read, _write) = tokio::io::split(server);
            let mut lines = BufReader::new(read).lines();
            let _ = lines.next_line().await;
        });

        let err = client.request("tools/list", None).await.unwrap_err();
        assert!(matches!(err, ConnectionError::Closed));
        server_task.await.unwrap();
        assert!(client.is_closed());
        assert!(matches!(
            client.request("tools/list", None).await,
            Err(ConnectionError::Closed)
        ));
    }
}
