//! Conversation turns and the per-request session history.
//!
//! A chat request arrives with prior `{role, content}` turns; the
//! orchestration loop appends the new user turn, assistant tool requests and
//! tool results to a [`SessionHistory`] it owns for the request's duration.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

use crate::tool::{ToolCallRequest, ToolOutcome, ToolResult};

/// The role of a turn in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// Tool execution result
    Tool,
    /// Client-supplied instructions; the configured system prompt wins
    System,
}

/// A single turn in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,

    #[serde(default)]
    pub content: String,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    /// An assistant turn that requested tool calls. Content is empty.
    pub fn assistant_tool_calls(calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            tool_call_id: None,
            tool_calls: calls,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            tool_calls: Vec::new(),
        }
    }
}

/// Violations of the history ordering rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("tool result for '{id}' has no pending assistant request")]
    UnrequestedToolResult { id: String },
}

/// Ordered, append-only history for one chat request.
///
/// A tool turn can only be appended while an assistant turn has an
/// unanswered request with the same id.
#[derive(Debug, Clone, Default)]
pub struct SessionHistory {
    turns: Vec<ConversationTurn>,
    pending: HashSet<String>,
}

impl SessionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the history from turns supplied by the client.
    ///
    /// Inbound history carries no tool requests, so `tool` turns (and turns
    /// with no text) are dropped. `system` turns are dropped too; the
    /// completion client supplies its own system prompt.
    pub fn from_prior(prior: impl IntoIterator<Item = ConversationTurn>) -> Self {
        let mut history = Self::new();
        for turn in prior {
            match turn.role {
                Role::Tool => {
                    debug!("Dropping inbound tool turn without a matching request");
                }
                Role::System => {
                    debug!("Dropping inbound system turn");
                }
                _ if turn.content.trim().is_empty() => {}
                Role::User => history.turns.push(ConversationTurn::user(turn.content)),
                Role::Assistant => history.turns.push(ConversationTurn::assistant(turn.content)),
            }
        }
        history
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(ConversationTurn::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.turns.push(ConversationTurn::assistant(content));
    }

    /// Record an assistant request for tool calls; their ids become pending.
    pub fn push_tool_calls(&mut self, calls: Vec<ToolCallRequest>) {
        self.pending.extend(calls.iter().map(|c| c.id.clone()));
        self.turns.push(ConversationTurn::assistant_tool_calls(calls));
    }

    /// Append a tool result, truncating its text to `max_chars` characters.
    pub fn push_tool_result(
        &mut self,
        result: &ToolResult,
        max_chars: usize,
    ) -> Result<(), HistoryError> {
        if !self.pending.remove(&result.tool_call_id) {
            return Err(HistoryError::UnrequestedToolResult {
                id: result.tool_call_id.clone(),
            });
        }

        let content = match &result.outcome {
            ToolOutcome::Success(payload) => truncate_chars(payload, max_chars),
            ToolOutcome::Failure(failure) => truncate_chars(
                &format!("Error [{}]: {}", failure.kind, failure.message),
                max_chars,
            ),
        };
        self.turns
            .push(ConversationTurn::tool_result(&result.tool_call_id, content));
        Ok(())
    }

    /// Number of requested tool calls that have no result yet.
    pub fn pending_tool_calls(&self) -> usize {
        self.pending.len()
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((byte_idx, _)) => format!("{}\n[truncated]", &text[..byte_idx]),
    }
}
