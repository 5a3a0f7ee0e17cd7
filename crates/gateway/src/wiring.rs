//! Builds the chat loop and its clients from application configuration.

use std::sync::Arc;
use std::time::Duration;

use railchat_agent::{ChatLoop, LoopConfig};
use railchat_config::AppConfig;
use railchat_providers::{OpenAiCompatClient, OpenAiCompatConfig};
use railchat_rpc::{HttpTransport, HttpTransportConfig, RpcClient, RpcClientOptions, SchemaCache};

/// The RPC client for the configured tool endpoint.
pub fn build_rpc_client(config: &AppConfig) -> railchat_core::Result<Arc<RpcClient>> {
    let transport = HttpTransport::new(HttpTransportConfig {
        endpoint: config.rpc.endpoint.clone(),
        api_key: config.rpc.api_key.clone().unwrap_or_default(),
        api_host: config.rpc.api_host.clone(),
        protocol_version: config.rpc.protocol_version.clone(),
        timeout: Duration::from_secs(config.rpc.timeout_secs),
    })?;

    let options = RpcClientOptions {
        protocol_version: config.rpc.protocol_version.clone(),
        retry_backoff: Duration::from_millis(config.rpc.retry_backoff_ms),
        stringify_arguments: config.rpc.stringify_arguments,
        ..Default::default()
    };
    Ok(Arc::new(RpcClient::new(Arc::new(transport), options)))
}

/// The process-wide chat loop: completion client, tool host, schema cache.
pub fn build_chat_loop(config: &AppConfig) -> railchat_core::Result<ChatLoop> {
    config
        .validate()
        .map_err(|e| railchat_core::Error::Config {
            message: e.to_string(),
        })?;

    let completion = OpenAiCompatClient::new(OpenAiCompatConfig {
        base_url: config.model.base_url.clone(),
        api_key: config.model.api_key.clone().unwrap_or_default(),
        model: config.model.model.clone(),
        temperature: config.model.temperature,
        timeout: Duration::from_secs(config.model.timeout_secs),
        system_prompt: config.model.system_prompt.clone(),
    })?;
    let tool_host = build_rpc_client(config)?;
    let schemas = SchemaCache::new(config.rpc.idempotent_tools.iter().cloned());

    Ok(ChatLoop::new(
        Arc::new(completion),
        tool_host,
        Arc::new(schemas),
        loop_config(config),
    ))
}

pub fn loop_config(config: &AppConfig) -> LoopConfig {
    LoopConfig {
        max_iterations: config.agent.max_iterations,
        completion_timeout: Duration::from_secs(config.agent.completion_timeout_secs),
        event_buffer: config.agent.event_buffer,
        max_tool_result_chars: config.agent.max_tool_result_chars,
    }
}
