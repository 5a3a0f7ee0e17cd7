//! # railchat core
//!
//! Domain types, traits, and error definitions for the railchat assistant.
//! This crate has **no transport dependencies**: it defines the model that
//! the RPC client, the completion adapter and the orchestration loop all
//! implement against.
//!
//! The two external services are traits here (`ToolHost`,
//! `CompletionClient`), so each request can be wired with real clients or
//! with test doubles.

pub mod completion;
pub mod error;
pub mod event;
pub mod message;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use completion::{CompletionClient, Decision};
pub use error::{
    BridgeError, CompletionError, Error, LoopError, Result, RpcError, ToolErrorKind,
};
pub use event::DomainEvent;
pub use message::{ConversationTurn, HistoryError, Role, SessionHistory};
pub use tool::{
    FunctionSpec, FunctionTool, RpcInvocation, ToolCallRequest, ToolFailure, ToolHost,
    ToolOutcome, ToolResult, ToolSchema,
};
