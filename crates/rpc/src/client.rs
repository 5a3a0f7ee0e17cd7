//! JSON-RPC client for the remote tool host.
//!
//! Performs the MCP handshake once per client, lists tools (following
//! pagination) and calls them. Every reply is classified into success,
//! [`RpcError::Protocol`], [`RpcError::InvalidResponse`] or
//! [`RpcError::Transport`]; only transport failures on idempotent calls are
//! retried, once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use railchat_core::{
    RpcError, RpcInvocation, ToolErrorKind, ToolFailure, ToolHost, ToolResult, ToolSchema,
};
use serde_json::{Value, json};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::protocol::{
    CallToolResult, InitializeResult, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    ListToolsResult, methods,
};
use crate::transport::{HttpReply, RpcTransport};

/// Upper bound on `tools/list` pages, in case a server never stops paging.
const MAX_LIST_PAGES: usize = 64;

#[derive(Debug, Clone)]
pub struct RpcClientOptions {
    pub protocol_version: String,
    pub client_name: String,
    pub client_version: String,
    /// Wait before the single retry of a failed idempotent call.
    pub retry_backoff: Duration,
    /// Send scalar argument values as strings.
    pub stringify_arguments: bool,
}

impl Default for RpcClientOptions {
    fn default() -> Self {
        Self {
            protocol_version: "2025-03-26".into(),
            client_name: "railchat".into(),
            client_version: env!("CARGO_PKG_VERSION").into(),
            retry_backoff: Duration::from_millis(500),
            stringify_arguments: true,
        }
    }
}

/// The rendered result of a `tools/call`.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub text: String,
    /// The tool ran but flagged its own result as an error.
    pub is_error: bool,
}

pub struct RpcClient {
    transport: Arc<dyn RpcTransport>,
    options: RpcClientOptions,
    next_id: AtomicU64,
    session_id: RwLock<Option<String>>,
    initialized: OnceCell<()>,
}

impl RpcClient {
    pub fn new(transport: Arc<dyn RpcTransport>, options: RpcClientOptions) -> Self {
        Self {
            transport,
            options,
            next_id: AtomicU64::new(1),
            session_id: RwLock::new(None),
            initialized: OnceCell::new(),
        }
    }

    pub fn session_id(&self) -> Option<String> {
        self.session_id
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.initialized()
    }

    /// Run the MCP handshake. Completes at most once; a failed attempt is
    /// repeated by the next caller.
    pub async fn initialize(&self) -> Result<(), RpcError> {
        self.initialized
            .get_or_try_init(|| async {
                let params = json!({
                    "protocolVersion": self.options.protocol_version,
                    "capabilities": { "tools": {} },
                    "clientInfo": {
                        "name": self.options.client_name,
                        "version": self.options.client_version,
                    },
                });
                let result = self.request(methods::INITIALIZE, Some(params), true).await?;
                let init: InitializeResult = serde_json::from_value(result).unwrap_or_default();
                let server = init.server_info.unwrap_or_default();
                info!(
                    server = server.name.as_deref().unwrap_or("unknown"),
                    version = server.version.as_deref().unwrap_or("unknown"),
                    protocol = init.protocol_version.as_deref().unwrap_or("unknown"),
                    "Tool server initialized"
                );

                self.notify(methods::INITIALIZED).await;
                Ok::<(), RpcError>(())
            })
            .await
            .map(|_| ())
    }

    /// List every tool the server exposes, in server order.
    pub async fn discover_tools(&self) -> Result<Vec<ToolSchema>, RpcError> {
        self.initialize().await?;

        let mut schemas = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_LIST_PAGES {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let result = self.request(methods::TOOLS_LIST, params, true).await?;
            let page: ListToolsResult = serde_json::from_value(result)
                .map_err(|e| RpcError::InvalidResponse(format!("malformed tools/list: {e}")))?;

            schemas.extend(page.tools.into_iter().map(ToolSchema::from));
            match page.next_cursor {
                Some(next) if !next.is_empty() && cursor.as_deref() != Some(next.as_str()) => {
                    cursor = Some(next);
                }
                _ => break,
            }
        }

        info!(count = schemas.len(), "Discovered tools");
        Ok(schemas)
    }

    /// Call a tool by name.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        idempotent: bool,
    ) -> Result<ToolOutput, RpcError> {
        self.initialize().await?;

        let arguments = if self.options.stringify_arguments {
            stringify_arguments(arguments)
        } else {
            arguments
        };
        let params = json!({ "name": name, "arguments": arguments });
        let result = self
            .request(methods::TOOLS_CALL, Some(params), idempotent)
            .await?;

        let call: CallToolResult = serde_json::from_value(result.clone())
            .map_err(|e| RpcError::InvalidResponse(format!("malformed tools/call result: {e}")))?;
        let text = match call.text() {
            Some(text) => text,
            None => match &call.structured_content {
                Some(structured) => structured.to_string(),
                None => result.to_string(),
            },
        };

        Ok(ToolOutput {
            text,
            is_error: call.is_error,
        })
    }

    /// Send a request, retrying once after a transport failure when the
    /// call is idempotent.
    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        idempotent: bool,
    ) -> Result<Value, RpcError> {
        let mut attempt = 1;
        loop {
            match self.send_once(method, params.clone()).await {
                Err(e) if idempotent && attempt == 1 && e.is_retryable() => {
                    warn!(method, attempt, error = %e, "RPC transport failure, retrying");
                    tokio::time::sleep(self.options.retry_backoff).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn send_once(&self, method: &str, params: Option<Value>) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let message = serde_json::to_value(JsonRpcRequest::new(id, method, params))
            .map_err(|e| RpcError::InvalidResponse(format!("unserializable request: {e}")))?;

        debug!(method, id, "Sending RPC request");
        let session = self.session_id();
        let reply = self.transport.post(&message, session.as_deref()).await?;
        self.record_session(&reply);

        if !reply.is_success() {
            return Err(RpcError::transport(format!(
                "tool server returned HTTP {}",
                reply.status
            )));
        }

        classify(id, &reply)
    }

    /// Fire-and-forget notification; failures are logged only.
    async fn notify(&self, method: &str) {
        let message = match serde_json::to_value(JsonRpcNotification::new(method)) {
            Ok(message) => message,
            Err(e) => {
                warn!(method, error = %e, "Failed to encode notification");
                return;
            }
        };
        let session = self.session_id();
        match self.transport.post(&message, session.as_deref()).await {
            Ok(reply) => self.record_session(&reply),
            Err(e) => warn!(method, error = %e, "Failed to send notification"),
        }
    }

    fn record_session(&self, reply: &HttpReply) {
        if let Some(session) = &reply.session_id {
            let mut current = self.session_id.write().unwrap_or_else(|e| e.into_inner());
            if current.as_deref() != Some(session.as_str()) {
                debug!("Tool server assigned a session id");
                *current = Some(session.clone());
            }
        }
    }
}

/// Turn a raw reply into the `result` value for request `id`.
fn classify(id: u64, reply: &HttpReply) -> Result<Value, RpcError> {
    let response = if reply.is_event_stream() {
        find_in_event_stream(id, &reply.body)?
    } else {
        serde_json::from_str::<JsonRpcResponse>(&reply.body)
            .map_err(|e| RpcError::InvalidResponse(format!("reply is not JSON-RPC: {e}")))?
    };

    if !response.answers(id) {
        return Err(RpcError::InvalidResponse(format!(
            "reply id {} does not match request id {id}",
            response.id
        )));
    }

    if let Some(error) = response.error {
        return Err(RpcError::Protocol {
            code: error.code,
            message: error.message,
            data: error.data,
        });
    }

    response
        .result
        .ok_or_else(|| RpcError::InvalidResponse("reply has neither result nor error".into()))
}

/// Pick the JSON-RPC reply for `id` out of a `text/event-stream` body.
fn find_in_event_stream(id: u64, body: &str) -> Result<JsonRpcResponse, RpcError> {
    let normalized = body.replace("\r\n", "\n");
    for event in normalized.split("\n\n") {
        let data: Vec<&str> = event
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(|d| d.strip_prefix(' ').unwrap_or(d))
            .collect();
        if data.is_empty() {
            continue;
        }
        let Ok(response) = serde_json::from_str::<JsonRpcResponse>(&data.join("\n")) else {
            continue;
        };
        if response.answers(id) {
            return Ok(response);
        }
    }
    Err(RpcError::InvalidResponse(format!(
        "event stream has no reply for request id {id}"
    )))
}

/// Render scalar values as strings, keeping nulls and nested values as-is.
fn stringify_arguments(arguments: Value) -> Value {
    match arguments {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| {
                    let value = match value {
                        Value::Number(n) => Value::String(n.to_string()),
                        Value::Bool(b) => Value::String(b.to_string()),
                        other => other,
                    };
                    (key, value)
                })
                .collect(),
        ),
        other => other,
    }
}

#[async_trait]
impl ToolHost for RpcClient {
    async fn discover_tools(&self) -> Result<Vec<ToolSchema>, RpcError> {
        RpcClient::discover_tools(self).await
    }

    async fn invoke(&self, call_id: &str, invocation: RpcInvocation) -> ToolResult {
        let tool = invocation.name.as_str();
        match self
            .call_tool(tool, invocation.arguments, invocation.idempotent)
            .await
        {
            Ok(output) if output.is_error => {
                warn!(tool, call_id, "Tool reported an error");
                ToolResult::failure(
                    call_id,
                    ToolFailure::new(ToolErrorKind::Execution, output.text),
                )
            }
            Ok(output) => {
                debug!(tool, call_id, bytes = output.text.len(), "Tool call succeeded");
                ToolResult::success(call_id, output.text)
            }
            Err(e) => {
                warn!(tool, call_id, error = %e, "Tool call failed");
                ToolResult::failure(call_id, ToolFailure::from(&e))
            }
        }
    }
}
