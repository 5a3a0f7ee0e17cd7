//! Shared test doubles for loop tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use railchat_core::{
    CompletionClient, CompletionError, ConversationTurn, Decision, FunctionTool, RpcError,
    RpcInvocation, ToolCallRequest, ToolFailure, ToolHost, ToolResult, ToolSchema,
};
use serde_json::json;

/// A completion client that returns a scripted sequence of decisions and
/// records the history it was shown on each call.
pub struct ScriptedCompletion {
    script: Mutex<VecDeque<Result<Decision, CompletionError>>>,
    seen: Mutex<Vec<Vec<ConversationTurn>>>,
    delay: Option<Duration>,
}

impl ScriptedCompletion {
    pub fn new(script: Vec<Result<Decision, CompletionError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            seen: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    /// History passed to the `n`th call (0-based).
    pub fn history_at(&self, n: usize) -> Vec<ConversationTurn> {
        self.seen.lock().unwrap()[n].clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletion {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        history: &[ConversationTurn],
        _tools: &[FunctionTool],
    ) -> Result<Decision, CompletionError> {
        self.seen.lock().unwrap().push(history.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(CompletionError::InvalidResponse("script exhausted".into())))
    }
}

pub fn answer(text: &str) -> Result<Decision, CompletionError> {
    Ok(Decision::FinalAnswer(text.into()))
}

pub fn tool_calls(calls: Vec<ToolCallRequest>) -> Result<Decision, CompletionError> {
    Ok(Decision::ToolCalls(calls))
}

pub fn tool_call(id: &str, name: &str, arguments: serde_json::Value) -> ToolCallRequest {
    ToolCallRequest {
        id: id.into(),
        name: name.into(),
        arguments,
    }
}

/// An in-process tool host exposing a few railway tools.
pub struct MockToolHost {
    schemas: Vec<ToolSchema>,
    discovery_error: Option<RpcError>,
    failures: HashMap<String, RpcError>,
    payloads: HashMap<String, String>,
    delay: Option<Duration>,
    invoked: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockToolHost {
    pub fn railway() -> Self {
        let string_param = |name: &str| {
            let mut properties = serde_json::Map::new();
            properties.insert(name.to_string(), json!({"type": "string"}));
            json!({
                "type": "object",
                "properties": properties,
                "required": [name]
            })
        };
        Self {
            schemas: vec![
                ToolSchema {
                    name: "PNRStatus".into(),
                    description: "Get PNR status".into(),
                    parameters: string_param("pnrNumber"),
                    idempotent: true,
                },
                ToolSchema {
                    name: "SearchStation".into(),
                    description: "Search stations by name".into(),
                    parameters: string_param("query"),
                    idempotent: true,
                },
            ],
            discovery_error: None,
            failures: HashMap::new(),
            payloads: HashMap::new(),
            delay: None,
            invoked: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            discovery_error: Some(RpcError::transport("connection refused")),
            ..Self::railway()
        }
    }

    pub fn failing(mut self, tool: &str, err: RpcError) -> Self {
        self.failures.insert(tool.into(), err);
        self
    }

    pub fn with_payload(mut self, tool: &str, payload: String) -> Self {
        self.payloads.insert(tool.into(), payload);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn invocations(&self) -> usize {
        self.invoked.lock().unwrap().len()
    }

    pub fn invoked_names(&self) -> Vec<String> {
        self.invoked.lock().unwrap().clone()
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolHost for MockToolHost {
    async fn discover_tools(&self) -> Result<Vec<ToolSchema>, RpcError> {
        match &self.discovery_error {
            Some(err) => Err(err.clone()),
            None => Ok(self.schemas.clone()),
        }
    }

    async fn invoke(&self, call_id: &str, invocation: RpcInvocation) -> ToolResult {
        self.invoked.lock().unwrap().push(invocation.name.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(err) = self.failures.get(&invocation.name) {
            return ToolResult::failure(call_id, ToolFailure::from(err));
        }
        let payload = self.payloads.get(&invocation.name).cloned().unwrap_or_else(|| {
            json!({"tool": invocation.name, "status": "CNF"}).to_string()
        });
        ToolResult::success(call_id, payload)
    }
}
