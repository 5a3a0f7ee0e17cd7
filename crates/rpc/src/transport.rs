//! HTTP transport for JSON-RPC messages.
//!
//! [`RpcTransport`] is the seam between the client and the network: one
//! POST in, one raw reply out. Status checks and body parsing happen in the
//! client so that every transport is classified the same way.

use std::time::Duration;

use async_trait::async_trait;
use railchat_core::RpcError;
use tracing::trace;

/// Header carrying the MCP session id.
pub const SESSION_HEADER: &str = "Mcp-Session-Id";

/// A raw HTTP reply.
#[derive(Debug, Clone, Default)]
pub struct HttpReply {
    pub status: u16,
    pub content_type: Option<String>,
    /// `Mcp-Session-Id` returned by the server, if any
    pub session_id: Option<String>,
    pub body: String,
}

impl HttpReply {
    /// A 200 `application/json` reply.
    pub fn json(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type: Some("application/json".into()),
            session_id: None,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_event_stream(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("text/event-stream"))
    }
}

/// Delivers one JSON-RPC message and returns the raw reply.
///
/// Implementations report connect failures, resets and timeouts as
/// [`RpcError::Transport`].
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn post(
        &self,
        message: &serde_json::Value,
        session_id: Option<&str>,
    ) -> Result<HttpReply, RpcError>;
}

/// Endpoint and credentials for [`HttpTransport`].
#[derive(Clone)]
pub struct HttpTransportConfig {
    pub endpoint: String,
    pub api_key: String,
    pub api_host: String,
    pub protocol_version: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for HttpTransportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransportConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .field("api_host", &self.api_host)
            .field("protocol_version", &self.protocol_version)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// POSTs JSON-RPC to an MCP-over-HTTP endpoint with RapidAPI headers.
pub struct HttpTransport {
    config: HttpTransportConfig,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Result<Self, RpcError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RpcError::transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    fn describe(&self, err: reqwest::Error) -> RpcError {
        if err.is_timeout() {
            RpcError::transport(format!(
                "request timed out after {}s",
                self.config.timeout.as_secs()
            ))
        } else if err.is_connect() {
            RpcError::transport("could not connect to the tool server")
        } else {
            RpcError::transport(err.without_url().to_string())
        }
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn post(
        &self,
        message: &serde_json::Value,
        session_id: Option<&str>,
    ) -> Result<HttpReply, RpcError> {
        let mut request = self
            .client
            .post(&self.config.endpoint)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream")
            .header("x-api-key", &self.config.api_key)
            .header("x-api-host", &self.config.api_host)
            .header("MCP-Protocol-Version", &self.config.protocol_version)
            .json(message);
        if let Some(session) = session_id {
            request = request.header(SESSION_HEADER, session);
        }

        let response = request.send().await.map_err(|e| self.describe(e))?;

        let status = response.status().as_u16();
        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(String::from)
        };
        let content_type = header("content-type");
        let session_id = header(SESSION_HEADER);

        let body = response.text().await.map_err(|e| self.describe(e))?;
        trace!(status, bytes = body.len(), "RPC reply received");

        Ok(HttpReply {
            status,
            content_type,
            session_id,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_classification_helpers() {
        let reply = HttpReply::json("{}");
        assert!(reply.is_success());
        assert!(!reply.is_event_stream());

        let sse = HttpReply {
            status: 200,
            content_type: Some("text/event-stream; charset=utf-8".into()),
            ..Default::default()
        };
        assert!(sse.is_event_stream());

        let failed = HttpReply {
            status: 502,
            ..Default::default()
        };
        assert!(!failed.is_success());
    }

    #[test]
    fn config_debug_hides_key() {
        let config = HttpTransportConfig {
            endpoint: "https://mcp.example".into(),
            api_key: "secret-key".into(),
            api_host: "irctc1.p.rapidapi.com".into(),
            protocol_version: "2025-03-26".into(),
            timeout: Duration::from_secs(60),
        };
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("secret-key"));
        assert!(HttpTransport::new(config).is_ok());
    }
}
