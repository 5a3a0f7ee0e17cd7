//! Remote tool host access for railchat.
//!
//! Speaks JSON-RPC 2.0 (MCP over HTTP) to the tool endpoint:
//! - [`protocol`]: wire types for requests, replies and MCP payloads
//! - [`transport`]: the HTTP POST seam ([`RpcTransport`]) and its reqwest impl
//! - [`client`]: handshake, discovery, tool calls and the retry policy
//! - [`cache`]: the process-wide [`SchemaCache`]

pub mod cache;
pub mod client;
pub mod protocol;
pub mod transport;

pub use cache::SchemaCache;
pub use client::{RpcClient, RpcClientOptions, ToolOutput};
pub use transport::{HttpReply, HttpTransport, HttpTransportConfig, RpcTransport};
