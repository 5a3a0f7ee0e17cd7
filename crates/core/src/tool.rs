//! Tool types: schemas discovered from the tool host, calls requested by
//! the model, and the results fed back into the conversation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{RpcError, ToolErrorKind};

/// A tool advertised by the remote tool host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// JSON Schema describing the tool's parameters
    #[serde(default)]
    pub parameters: serde_json::Value,

    /// Safe to retry after a transport failure (read-only lookups).
    #[serde(default)]
    pub idempotent: bool,
}

/// A tool definition in the model API's function-calling format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionTool {
    pub r#type: String,
    pub function: FunctionSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A model-requested invocation of a named tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Unique call ID (matches the model's tool_call.id)
    pub id: String,

    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

impl ToolCallRequest {
    /// Id for a call the model returned without one.
    pub fn generated_id() -> String {
        format!("call_{}", uuid::Uuid::new_v4().simple())
    }
}

/// A validated call, ready for the tool host.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcInvocation {
    pub name: String,
    pub arguments: serde_json::Value,
    pub idempotent: bool,
}

/// Why a tool call failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFailure {
    pub kind: ToolErrorKind,
    pub message: String,
}

impl ToolFailure {
    pub fn new(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&RpcError> for ToolFailure {
    fn from(err: &RpcError) -> Self {
        let message = match err {
            RpcError::Transport { reason } => reason.clone(),
            RpcError::Protocol { code, message, .. } => format!("[{code}] {message}"),
            RpcError::InvalidResponse(reason) => reason.clone(),
        };
        Self::new(err.kind(), message)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Success(String),
    Failure(ToolFailure),
}

/// The result of one tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub outcome: ToolOutcome,
}

impl ToolResult {
    pub fn success(tool_call_id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            outcome: ToolOutcome::Success(payload.into()),
        }
    }

    pub fn failure(tool_call_id: impl Into<String>, failure: ToolFailure) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            outcome: ToolOutcome::Failure(failure),
        }
    }
}

/// The remote tool host.
///
/// Implemented by the JSON-RPC client; the orchestration loop only sees
/// this trait, so tests can substitute an in-process host.
#[async_trait]
pub trait ToolHost: Send + Sync {
    /// Fetch the ordered list of tools the host exposes.
    async fn discover_tools(&self) -> std::result::Result<Vec<ToolSchema>, RpcError>;

    /// Invoke a validated call. Failures are folded into the outcome.
    async fn invoke(&self, call_id: &str, invocation: RpcInvocation) -> ToolResult;
}
