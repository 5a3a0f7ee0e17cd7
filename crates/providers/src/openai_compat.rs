//! OpenAI-compatible completion client.
//!
//! Works with OpenAI and any endpoint exposing `/chat/completions` with
//! function calling (OpenRouter, vLLM, Ollama, ...).
//!
//! One `complete()` call is exactly one non-streaming HTTP request. The
//! configured system prompt is prepended to every request.

use std::time::Duration;

use async_trait::async_trait;
use railchat_core::{
    CompletionClient, CompletionError, ConversationTurn, Decision, FunctionTool, Role,
    ToolCallRequest,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Settings for [`OpenAiCompatClient`].
#[derive(Clone)]
pub struct OpenAiCompatConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
    pub system_prompt: String,
}

impl std::fmt::Debug for OpenAiCompatConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// An OpenAI-compatible completion client.
pub struct OpenAiCompatClient {
    name: String,
    base_url: String,
    config: OpenAiCompatConfig,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    pub fn new(config: OpenAiCompatConfig) -> Result<Self, CompletionError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CompletionError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            name: "openai".into(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            config,
            client,
        })
    }

    /// Convert history to OpenAI messages, system prompt first.
    fn to_api_messages(system_prompt: &str, history: &[ConversationTurn]) -> Vec<ApiMessage> {
        let system = ApiMessage {
            role: "system".into(),
            content: Some(system_prompt.to_string()),
            tool_calls: None,
            tool_call_id: None,
        };

        std::iter::once(system)
            .chain(history.iter().map(|turn| {
                let tool_calls = if turn.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        turn.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: tc.name.clone(),
                                    arguments: encode_arguments(&tc.arguments),
                                },
                            })
                            .collect(),
                    )
                };
                ApiMessage {
                    role: match turn.role {
                        Role::User => "user".into(),
                        Role::Assistant => "assistant".into(),
                        Role::Tool => "tool".into(),
                        Role::System => "system".into(),
                    },
                    content: if tool_calls.is_some() && turn.content.is_empty() {
                        None
                    } else {
                        Some(turn.content.clone())
                    },
                    tool_calls,
                    tool_call_id: turn.tool_call_id.clone(),
                }
            }))
            .collect()
    }

    fn request_body(&self, history: &[ConversationTurn], tools: &[FunctionTool]) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.config.model,
            "messages": Self::to_api_messages(&self.config.system_prompt, history),
            "temperature": self.config.temperature,
            "stream": false,
        });

        if !tools.is_empty() {
            body["tools"] = serde_json::json!(tools);
            body["tool_choice"] = serde_json::json!("auto");
        }
        body
    }

    fn describe(&self, err: reqwest::Error) -> CompletionError {
        if err.is_timeout() {
            CompletionError::Timeout {
                secs: self.config.timeout.as_secs(),
            }
        } else {
            CompletionError::Transport(err.without_url().to_string())
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        history: &[ConversationTurn],
        tools: &[FunctionTool],
    ) -> std::result::Result<Decision, CompletionError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(history, tools);

        debug!(
            provider = %self.name,
            model = %self.config.model,
            turns = history.len(),
            tools = tools.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| self.describe(e))?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| self.describe(e))?;
        interpret_response(status, &text)
    }
}

/// Map an HTTP status and body to a decision or a classified failure.
fn interpret_response(status: u16, body: &str) -> Result<Decision, CompletionError> {
    if !(200..300).contains(&status) {
        let detail = serde_json::from_str::<ApiErrorBody>(body).ok().map(|b| b.error);
        let message = detail
            .as_ref()
            .and_then(|d| d.message.clone())
            .unwrap_or_else(|| format!("HTTP {status}"));
        let quota = detail.as_ref().is_some_and(|d| {
            d.code.as_deref() == Some("insufficient_quota")
                || d.r#type.as_deref() == Some("insufficient_quota")
        });
        warn!(status, message = %message, "Completion API returned an error");

        return Err(match status {
            401 | 403 => CompletionError::Authentication(message),
            429 => CompletionError::Quota(message),
            _ if quota => CompletionError::Quota(message),
            _ => CompletionError::Api {
                status_code: status,
                message,
            },
        });
    }

    let api_response: ApiResponse = serde_json::from_str(body)
        .map_err(|e| CompletionError::InvalidResponse(format!("failed to parse response: {e}")))?;

    let choice = api_response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| CompletionError::InvalidResponse("no choices in response".into()))?;

    let tool_calls = choice.message.tool_calls.unwrap_or_default();
    if tool_calls.is_empty() {
        return Ok(Decision::FinalAnswer(
            choice.message.content.unwrap_or_default(),
        ));
    }

    let calls = tool_calls
        .into_iter()
        .map(|tc| ToolCallRequest {
            id: if tc.id.is_empty() {
                ToolCallRequest::generated_id()
            } else {
                tc.id
            },
            name: tc.function.name,
            arguments: decode_arguments(&tc.function.arguments),
        })
        .collect();
    Ok(Decision::ToolCalls(calls))
}

/// Parse the model's argument string. Unparseable text is kept as a JSON
/// string so validation can reject it with a useful message.
fn decode_arguments(raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return serde_json::json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

fn encode_arguments(arguments: &serde_json::Value) -> String {
    match arguments {
        serde_json::Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    #[serde(default)]
    id: String,
    #[serde(default = "function_type")]
    r#type: String,
    function: ApiFunction,
}

fn function_type() -> String {
    "function".into()
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    r#type: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use railchat_core::FunctionSpec;
    use std::sync::{Arc, Mutex};

    fn config(base_url: &str) -> OpenAiCompatConfig {
        OpenAiCompatConfig {
            base_url: base_url.into(),
            api_key: "sk-test".into(),
            model: "gpt-4o-mini".into(),
            temperature: 0.3,
            timeout: Duration::from_secs(5),
            system_prompt: "You are a railway assistant.".into(),
        }
    }

    fn pnr_tool() -> FunctionTool {
        FunctionTool {
            r#type: "function".into(),
            function: FunctionSpec {
                name: "PNRStatus".into(),
                description: "Check PNR status".into(),
                parameters: serde_json::json!({"type": "object"}),
            },
        }
    }

    #[test]
    fn message_conversion_prepends_system_prompt() {
        let history = vec![
            ConversationTurn::user("Check PNR 1234567890"),
            ConversationTurn::assistant_tool_calls(vec![ToolCallRequest {
                id: "call_1".into(),
                name: "PNRStatus".into(),
                arguments: serde_json::json!({"pnrNumber": "1234567890"}),
            }]),
            ConversationTurn::tool_result("call_1", "CNF"),
        ];
        let api = OpenAiCompatClient::to_api_messages("sys", &history);
        assert_eq!(api.len(), 4);
        assert_eq!(api[0].role, "system");
        assert_eq!(api[1].role, "user");
        assert!(api[2].content.is_none());
        let calls = api[2].tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.arguments, r#"{"pnrNumber":"1234567890"}"#);
        assert_eq!(api[3].role, "tool");
        assert_eq!(api[3].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn request_body_sets_tool_choice_only_with_tools() {
        let client = OpenAiCompatClient::new(config("http://localhost")).unwrap();
        let history = [ConversationTurn::user("hi")];

        let body = client.request_body(&history, &[]);
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());

        let body = client.request_body(&history, &[pnr_tool()]);
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["tools"][0]["function"]["name"], "PNRStatus");
        assert_eq!(body["model"], "gpt-4o-mini");
    }

    #[test]
    fn final_answer_parsed() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Hello!"}}]}"#;
        assert_eq!(
            interpret_response(200, body).unwrap(),
            Decision::FinalAnswer("Hello!".into())
        );
    }

    #[test]
    fn tool_calls_parsed_in_order() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":null,"tool_calls":[
            {"id":"call_a","type":"function","function":{"name":"SearchStation","arguments":"{\"query\":\"Delhi\"}"}},
            {"id":"call_b","type":"function","function":{"name":"PNRStatus","arguments":"{\"pnrNumber\":\"1234567890\"}"}}
        ]}}]}"#;
        match interpret_response(200, body).unwrap() {
            Decision::ToolCalls(calls) => {
                assert_eq!(calls.len(), 2);
                assert_eq!(calls[0].name, "SearchStation");
                assert_eq!(calls[0].arguments["query"], "Delhi");
                assert_eq!(calls[1].id, "call_b");
            }
            other => panic!("expected tool calls, got {other:?}"),
        }
    }

    #[test]
    fn malformed_arguments_kept_as_string_and_missing_id_generated() {
        let body = r#"{"choices":[{"message":{"tool_calls":[
            {"function":{"name":"PNRStatus","arguments":"{pnr: 123"}}
        ]}}]}"#;
        match interpret_response(200, body).unwrap() {
            Decision::ToolCalls(calls) => {
                assert!(calls[0].id.starts_with("call_"));
                assert_eq!(calls[0].arguments, serde_json::json!("{pnr: 123"));
            }
            other => panic!("expected tool calls, got {other:?}"),
        }
    }

    #[test]
    fn error_statuses_classified() {
        assert!(matches!(
            interpret_response(401, r#"{"error":{"message":"Incorrect API key"}}"#),
            Err(CompletionError::Authentication(_))
        ));
        assert!(matches!(
            interpret_response(403, ""),
            Err(CompletionError::Authentication(_))
        ));
        assert!(matches!(
            interpret_response(429, r#"{"error":{"message":"Rate limit"}}"#),
            Err(CompletionError::Quota(_))
        ));
        assert!(matches!(
            interpret_response(
                400,
                r#"{"error":{"message":"You exceeded your quota","type":"insufficient_quota","code":"insufficient_quota"}}"#
            ),
            Err(CompletionError::Quota(_))
        ));
        match interpret_response(500, "upstream exploded") {
            Err(CompletionError::Api {
                status_code,
                message,
            }) => {
                assert_eq!(status_code, 500);
                assert_eq!(message, "HTTP 500");
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[test]
    fn undecodable_or_empty_body_is_invalid() {
        assert!(matches!(
            interpret_response(200, "not json"),
            Err(CompletionError::InvalidResponse(_))
        ));
        assert!(matches!(
            interpret_response(200, r#"{"choices":[]}"#),
            Err(CompletionError::InvalidResponse(_))
        ));
    }

    #[test]
    fn debug_redacts_key() {
        let dbg = format!("{:?}", config("http://localhost"));
        assert!(!dbg.contains("sk-test"));
    }

    #[tokio::test]
    async fn complete_round_trip_against_stub_server() {
        use axum::{Json, Router, http::HeaderMap, routing::post};

        let captured: Arc<Mutex<Option<(String, serde_json::Value)>>> = Arc::default();
        let sink = captured.clone();
        let app = Router::new().route(
            "/v1/chat/completions",
            post(move |headers: HeaderMap, Json(body): Json<serde_json::Value>| {
                let sink = sink.clone();
                async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    *sink.lock().unwrap() = Some((auth, body));
                    Json(serde_json::json!({
                        "choices": [{"message": {"role": "assistant", "content": "All trains on time."}}]
                    }))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = OpenAiCompatClient::new(config(&format!("http://{addr}/v1/"))).unwrap();
        let decision = client
            .complete(&[ConversationTurn::user("Any delays?")], &[pnr_tool()])
            .await
            .unwrap();
        assert_eq!(decision, Decision::FinalAnswer("All trains on time.".into()));

        let (auth, body) = captured.lock().unwrap().take().unwrap();
        assert_eq!(auth, "Bearer sk-test");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "You are a railway assistant.");
        assert_eq!(body["messages"][1]["content"], "Any delays?");
        assert_eq!(body["tool_choice"], "auto");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_error() {
        // Bind then drop to get a port with nothing listening.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = OpenAiCompatClient::new(config(&format!("http://{addr}"))).unwrap();
        let err = client
            .complete(&[ConversationTurn::user("hi")], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::Transport(_)));
    }
}
