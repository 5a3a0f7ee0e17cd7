//! Completion API clients for railchat.
//!
//! All clients implement the `railchat_core::CompletionClient` trait.
//! The OpenAI-compatible adapter covers OpenAI itself and any endpoint that
//! exposes `/chat/completions` with function calling.

pub mod openai_compat;

pub use openai_compat::{OpenAiCompatClient, OpenAiCompatConfig};
