//! Error types for the railchat domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Errors are split by the scope they affect: a single tool call
//! (`RpcError`, `BridgeError`) or the whole request (`CompletionError`,
//! `LoopError`).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The top-level error type for railchat operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Completion error: {0}")]
    Completion(#[from] CompletionError),

    #[error("Loop error: {0}")]
    Loop(#[from] LoopError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Tool-call scoped errors ---

/// Failures talking to the remote tool host.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// Timeout, connection reset, refused connection or non-success HTTP status.
    #[error("transport failure: {reason}")]
    Transport { reason: String },

    /// The remote side answered with a well-formed JSON-RPC error object.
    #[error("remote error [{code}]: {message}")]
    Protocol {
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// The reply was malformed, or did not match the request id.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl RpcError {
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Only transport failures may be retried, and only for idempotent calls.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    pub fn kind(&self) -> ToolErrorKind {
        match self {
            Self::Transport { .. } => ToolErrorKind::Transport,
            Self::Protocol { .. } => ToolErrorKind::Protocol,
            Self::InvalidResponse(_) => ToolErrorKind::InvalidResponse,
        }
    }
}

/// Tool calls rejected before they reach the tool host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("unknown tool: '{name}'")]
    UnknownTool { name: String },

    #[error("invalid arguments for '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },
}

impl BridgeError {
    pub fn kind(&self) -> ToolErrorKind {
        match self {
            Self::UnknownTool { .. } => ToolErrorKind::UnknownTool,
            Self::InvalidArguments { .. } => ToolErrorKind::InvalidArguments,
        }
    }
}

/// Classification carried by `tool_error` events and failure tool turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolErrorKind {
    Transport,
    Protocol,
    InvalidResponse,
    UnknownTool,
    InvalidArguments,
    /// The tool ran but reported a failure in its own result.
    Execution,
}

impl std::fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Transport => "Transport",
            Self::Protocol => "Protocol",
            Self::InvalidResponse => "InvalidResponse",
            Self::UnknownTool => "UnknownTool",
            Self::InvalidArguments => "InvalidArguments",
            Self::Execution => "Execution",
        };
        f.write_str(s)
    }
}

// --- Request scoped errors ---

/// Failures of the completion API. All of them are fatal for the request.
#[derive(Debug, Clone, Error)]
pub enum CompletionError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("quota exhausted or rate limited: {0}")]
    Quota(String),

    #[error("network error: {0}")]
    Transport(String),

    #[error("completion timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("invalid completion response: {0}")]
    InvalidResponse(String),
}

impl CompletionError {
    /// A message safe to show to an end user: no URLs, keys or raw bodies.
    pub fn sanitized(&self) -> &'static str {
        match self {
            Self::Authentication(_) => "The AI service rejected our credentials.",
            Self::Quota(_) => "The AI service is over capacity. Please try again later.",
            Self::Transport(_) | Self::Timeout { .. } => {
                "The AI service could not be reached. Please try again."
            }
            Self::Api { .. } | Self::InvalidResponse(_) => {
                "The AI service returned an unexpected error."
            }
        }
    }
}

/// Errors that terminate a whole chat request.
#[derive(Debug, Clone, Error)]
pub enum LoopError {
    #[error("iteration limit of {limit} exceeded")]
    IterationLimitExceeded { limit: u32 },

    #[error("completion failed: {0}")]
    Completion(#[from] CompletionError),

    #[error("tool discovery failed: {0}")]
    Discovery(RpcError),
}

impl LoopError {
    /// The text carried by the terminal `error` event.
    pub fn client_message(&self) -> String {
        match self {
            Self::IterationLimitExceeded { .. } => {
                "Reached the maximum number of tool iterations. Please try again.".into()
            }
            Self::Completion(e) => e.sanitized().into(),
            Self::Discovery(_) => "The railway tool service is unavailable right now.".into(),
        }
    }
}
