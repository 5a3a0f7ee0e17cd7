//! Completion client trait: the abstraction over the LLM backend.
//!
//! A completion client sends the conversation and the available function
//! schemas to the model and returns its decision: a direct answer, or an
//! ordered list of tool calls. One call is exactly one request to the model.

use async_trait::async_trait;

use crate::error::CompletionError;
use crate::message::ConversationTurn;
use crate::tool::{FunctionTool, ToolCallRequest};

/// What the model decided to do with the conversation so far.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    FinalAnswer(String),
    ToolCalls(Vec<ToolCallRequest>),
}

/// The core completion trait.
///
/// The orchestration loop calls `complete()` without knowing which backend
/// is behind it.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// A human-readable name for this client (e.g., "openai").
    fn name(&self) -> &str;

    /// Send the history plus tool schemas; no retries, no internal turns.
    async fn complete(
        &self,
        history: &[ConversationTurn],
        tools: &[FunctionTool],
    ) -> std::result::Result<Decision, CompletionError>;
}
