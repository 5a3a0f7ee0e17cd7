//! Configuration loading, validation, and management for railchat.
//!
//! Loads configuration from `$RAILCHAT_CONFIG` (or `./railchat.toml`) with
//! environment variable overrides. Only the binary calls [`AppConfig::load`];
//! library crates receive the values they need as plain structs.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Completion API settings
    #[serde(default)]
    pub model: ModelConfig,

    /// Remote tool host settings
    #[serde(default)]
    pub rpc: RpcConfig,

    /// Orchestration loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Inbound HTTP settings
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model_base_url")]
    pub base_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_model_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_model_timeout() -> u64 {
    60
}

/// The railway assistant persona sent as the system turn.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful Indian Railways assistant powered by IRCTC tools.
You can help users with:
- Checking PNR status
- Finding trains between stations
- Getting train schedules
- Checking seat availability
- Getting fare information
- Train live status
- And more railway-related queries

When users ask about trains, use the available tools to fetch real-time information.
Always be helpful and provide clear, concise responses.
If a tool returns an error, explain it to the user in a friendly way.";

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.into()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_model_base_url(),
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
            timeout_secs: default_model_timeout(),
            system_prompt: default_system_prompt(),
        }
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_endpoint")]
    pub endpoint: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_api_host")]
    pub api_host: String,

    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,

    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    /// Tools that are safe to retry once after a transport failure.
    #[serde(default)]
    pub idempotent_tools: Vec<String>,

    /// Send scalar argument values as strings (required by RapidAPI hosts).
    #[serde(default = "default_true")]
    pub stringify_arguments: bool,
}

fn default_rpc_endpoint() -> String {
    "https://mcp.rapidapi.com".into()
}
fn default_api_host() -> String {
    "irctc1.p.rapidapi.com".into()
}
fn default_protocol_version() -> String {
    "2025-03-26".into()
}
fn default_rpc_timeout() -> u64 {
    60
}
fn default_retry_backoff() -> u64 {
    500
}
fn default_true() -> bool {
    true
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: default_rpc_endpoint(),
            api_key: None,
            api_host: default_api_host(),
            protocol_version: default_protocol_version(),
            timeout_secs: default_rpc_timeout(),
            retry_backoff_ms: default_retry_backoff(),
            idempotent_tools: Vec::new(),
            stringify_arguments: true,
        }
    }
}

impl std::fmt::Debug for RpcConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &redact(&self.api_key))
            .field("api_host", &self.api_host)
            .field("protocol_version", &self.protocol_version)
            .field("timeout_secs", &self.timeout_secs)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("idempotent_tools", &self.idempotent_tools)
            .field("stringify_arguments", &self.stringify_arguments)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum completion calls per chat request
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    #[serde(default = "default_completion_timeout")]
    pub completion_timeout_secs: u64,

    /// Bounded event buffer between the loop and the transport
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Tool payloads longer than this are truncated before re-injection
    #[serde(default = "default_max_tool_result_chars")]
    pub max_tool_result_chars: usize,
}

fn default_max_iterations() -> u32 {
    10
}
fn default_completion_timeout() -> u64 {
    90
}
fn default_event_buffer() -> usize {
    32
}
fn default_max_tool_result_chars() -> usize {
    16_000
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            completion_timeout_secs: default_completion_timeout(),
            event_buffer: default_event_buffer(),
            max_tool_result_chars: default_max_tool_result_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_true")]
    pub allow_any_origin: bool,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allow_any_origin: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from `$RAILCHAT_CONFIG` or `./railchat.toml`,
    /// then apply environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("RAILCHAT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("railchat.toml"));
        let mut config = Self::load_from(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.model.api_key = Some(key);
        }
        if let Some(model) = lookup("OPENAI_MODEL") {
            self.model.model = model;
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            self.model.base_url = url;
        }
        if let Some(key) = lookup("RAPIDAPI_KEY") {
            self.rpc.api_key = Some(key);
        }
        if let Some(host) = lookup("RAPIDAPI_HOST") {
            self.rpc.api_host = host;
        }
        if let Some(url) = lookup("MCP_SERVER_URL") {
            self.rpc.endpoint = url;
        }
        if let Some(host) = lookup("HOST") {
            self.gateway.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.gateway.port = parse_var("PORT", &port)?;
        }
        if let Some(max) = lookup("RAILCHAT_MAX_ITERATIONS") {
            self.agent.max_iterations = parse_var("RAILCHAT_MAX_ITERATIONS", &max)?;
        }
        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(ConfigError::ValidationError(
                "model.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }
        if self.agent.event_buffer == 0 {
            return Err(ConfigError::ValidationError(
                "agent.event_buffer must be at least 1".into(),
            ));
        }
        if self.agent.max_tool_result_chars == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_tool_result_chars must be at least 1".into(),
            ));
        }
        if self.rpc.timeout_secs == 0
            || self.model.timeout_secs == 0
            || self.agent.completion_timeout_secs == 0
        {
            return Err(ConfigError::ValidationError(
                "timeouts must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Check that both external services have credentials.
    pub fn require_credentials(&self) -> Result<(), ConfigError> {
        if self.model.api_key.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::MissingCredential("OPENAI_API_KEY"));
        }
        if self.rpc.api_key.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::MissingCredential("RAPIDAPI_KEY"));
        }
        Ok(())
    }

    /// Generate a default config TOML string (for `railchat init`).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("{name} has an invalid value: {value}")))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("{0} environment variable is required")]
    MissingCredential(&'static str),
}
