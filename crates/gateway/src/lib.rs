//! HTTP gateway for railchat.
//!
//! Endpoints:
//!
//! - `GET  /health`: liveness and uptime
//! - `POST /api/chat`: send a message, receive an SSE stream of events
//! - `GET  /api/tools`: list the tools the railway server exposes
//! - `POST /api/tools/refresh`: re-discover and swap in the tool schemas
//!
//! Built on Axum. Each chat request owns its loop task; closing the
//! connection drops the event stream, which cancels the task.

pub mod wiring;

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::{HeaderName, StatusCode, header},
    response::sse::{Event as SseEvent, Sse},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use railchat_agent::ChatLoop;
use railchat_core::{ConversationTurn, LoopError, RpcError, ToolSchema};
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

pub use wiring::{build_chat_loop, build_rpc_client, loop_config};

const SERVICE_NAME: &str = "railchat";

/// Shared application state for the gateway.
pub struct GatewayState {
    pub chat: ChatLoop,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl GatewayState {
    pub fn new(chat: ChatLoop) -> Self {
        Self {
            chat,
            started_at: chrono::Utc::now(),
        }
    }
}

pub type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState, allow_any_origin: bool) -> Router {
    let cors = if allow_any_origin {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/tools", get(tools_handler))
        .route("/api/tools/refresh", post(refresh_tools_handler))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway HTTP server.
pub async fn start(config: railchat_config::AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.require_credentials()?;

    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let chat = build_chat_loop(&config)?;
    let state = Arc::new(GatewayState::new(chat));
    let app = build_router(state, config.gateway.allow_any_origin);

    info!(addr = %addr, model = %config.model.model, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    started_at: chrono::DateTime<chrono::Utc>,
    uptime_secs: u64,
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        started_at: state.started_at,
        uptime_secs: (chrono::Utc::now() - state.started_at).num_seconds().max(0) as u64,
    })
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// `POST /api/chat`: one data-only SSE frame per event, ending with `done`.
async fn chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Response {
    if payload.message.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "message must not be empty");
    }

    let run = state.chat.run(payload.message, payload.history);
    info!(request_id = %run.request_id(), "Chat stream opened");

    let stream = run.map(|event| SseEvent::default().json_data(&event));

    (
        [
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Sse::new(stream),
    )
        .into_response()
}

#[derive(Debug, Serialize)]
struct ToolSummary {
    name: String,
    description: String,
}

#[derive(Debug, Serialize)]
struct ToolsResponse {
    count: usize,
    tools: Vec<ToolSummary>,
}

fn tools_response(result: Result<Arc<[ToolSchema]>, RpcError>) -> Response {
    match result {
        Ok(schemas) => Json(ToolsResponse {
            count: schemas.len(),
            tools: schemas
                .iter()
                .map(|s| ToolSummary {
                    name: s.name.clone(),
                    description: s.description.clone(),
                })
                .collect(),
        })
        .into_response(),
        Err(e) => {
            warn!(error = %e, "Tool discovery failed");
            error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                LoopError::Discovery(e).client_message(),
            )
        }
    }
}

/// `GET /api/tools`: served from the schema cache.
async fn tools_handler(State(state): State<SharedState>) -> Response {
    let host = state.chat.tool_host().clone();
    tools_response(state.chat.schema_cache().get_or_populate(host.as_ref()).await)
}

/// `POST /api/tools/refresh`
async fn refresh_tools_handler(State(state): State<SharedState>) -> Response {
    let host = state.chat.tool_host().clone();
    info!("Refreshing tool schemas");
    tools_response(state.chat.schema_cache().refresh(host.as_ref()).await)
}
