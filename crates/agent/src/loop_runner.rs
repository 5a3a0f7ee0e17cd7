//! The chat orchestration loop.
//!
//! Per request: seed history, announce progress, fetch tool schemas, then
//! alternate between the model and the tool host until the model answers,
//! the iteration cap is hit, a fatal error occurs or the consumer leaves.
//! Tool calls within one model turn run sequentially, in model order.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use railchat_core::{
    CompletionClient, CompletionError, ConversationTurn, Decision, DomainEvent, LoopError,
    SessionHistory, ToolCallRequest, ToolFailure, ToolHost, ToolOutcome, ToolResult, ToolSchema,
};
use railchat_rpc::SchemaCache;
use tokio_stream::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::bridge;
use crate::emitter::{Cancelled, EventEmitter};

pub const ANALYZING: &str = "Analyzing your request...";
pub const REVIEWING: &str = "Reviewing tool results...";

/// Limits for one chat request.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Maximum completion calls per request
    pub max_iterations: u32,
    pub completion_timeout: Duration,
    /// Bounded event channel capacity
    pub event_buffer: usize,
    /// Tool payloads are truncated to this many characters in history
    pub max_tool_result_chars: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            completion_timeout: Duration::from_secs(90),
            event_buffer: 32,
            max_tool_result_chars: 16_000,
        }
    }
}

/// Why a request stopped early.
enum Stop {
    Cancelled,
    Failed(LoopError),
}

impl From<Cancelled> for Stop {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

impl From<LoopError> for Stop {
    fn from(err: LoopError) -> Self {
        Self::Failed(err)
    }
}

impl From<CompletionError> for Stop {
    fn from(err: CompletionError) -> Self {
        Self::Failed(LoopError::Completion(err))
    }
}

/// The orchestration loop. Stateless between requests; cheap to clone.
#[derive(Clone)]
pub struct ChatLoop {
    completion: Arc<dyn CompletionClient>,
    tool_host: Arc<dyn ToolHost>,
    schemas: Arc<SchemaCache>,
    config: LoopConfig,
}

impl ChatLoop {
    pub fn new(
        completion: Arc<dyn CompletionClient>,
        tool_host: Arc<dyn ToolHost>,
        schemas: Arc<SchemaCache>,
        config: LoopConfig,
    ) -> Self {
        Self {
            completion,
            tool_host,
            schemas,
            config,
        }
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn schema_cache(&self) -> &Arc<SchemaCache> {
        &self.schemas
    }

    pub fn tool_host(&self) -> &Arc<dyn ToolHost> {
        &self.tool_host
    }

    /// Start a request on its own task and return its event stream.
    ///
    /// Dropping the returned [`ChatRun`] cancels the request.
    pub fn run(&self, message: impl Into<String>, history: Vec<ConversationTurn>) -> ChatRun {
        let token = CancellationToken::new();
        let (emitter, rx) = EventEmitter::channel(self.config.event_buffer, token.clone());
        let request_id = uuid::Uuid::new_v4();
        let span = info_span!("chat", %request_id);

        let this = self.clone();
        let message = message.into();
        tokio::spawn(async move { this.drive(message, history, emitter).await }.instrument(span));

        ChatRun {
            request_id,
            events: ReceiverStream::new(rx),
            _guard: token.drop_guard(),
        }
    }

    /// Run one request against a caller-supplied emitter.
    pub async fn drive(
        &self,
        message: String,
        history: Vec<ConversationTurn>,
        emitter: EventEmitter,
    ) {
        info!(prior_turns = history.len(), "Chat request started");
        match self.execute(message, history, &emitter).await {
            Ok(()) => {
                info!("Chat request completed");
                emitter.finish(None).await;
            }
            Err(Stop::Cancelled) => {
                info!("Chat request cancelled by consumer");
            }
            Err(Stop::Failed(err)) => {
                error!(error = %err, "Chat request failed");
                emitter.finish(Some(err.client_message())).await;
            }
        }
    }

    async fn execute(
        &self,
        message: String,
        prior: Vec<ConversationTurn>,
        emitter: &EventEmitter,
    ) -> Result<(), Stop> {
        let mut history = SessionHistory::from_prior(prior);
        history.push_user(message);

        emitter.emit(DomainEvent::thinking(ANALYZING)).await?;

        let schemas = until_cancelled(
            emitter.token(),
            self.schemas.get_or_populate(self.tool_host.as_ref()),
        )
        .await?
        .map_err(LoopError::Discovery)?;
        let tools = bridge::to_model_schemas(&schemas);

        for iteration in 1..=self.config.max_iterations {
            if emitter.is_cancelled() {
                return Err(Stop::Cancelled);
            }
            if iteration > 1 {
                emitter.emit(DomainEvent::thinking(REVIEWING)).await?;
            }

            debug!(iteration, turns = history.len(), "Requesting completion");
            let secs = self.config.completion_timeout.as_secs();
            let decision = until_cancelled(
                emitter.token(),
                tokio::time::timeout(
                    self.config.completion_timeout,
                    self.completion.complete(history.turns(), &tools),
                ),
            )
            .await?
            .map_err(|_| CompletionError::Timeout { secs })??;

            match decision {
                Decision::FinalAnswer(text) => {
                    history.push_assistant(text.clone());
                    emitter.emit(DomainEvent::Response { text }).await?;
                    return Ok(());
                }
                Decision::ToolCalls(calls) => {
                    info!(iteration, count = calls.len(), "Model requested tool calls");
                    history.push_tool_calls(calls.clone());
                    for call in &calls {
                        self.run_tool(call, &schemas, &mut history, emitter).await?;
                    }
                }
            }
        }

        warn!(limit = self.config.max_iterations, "Iteration limit reached");
        Err(LoopError::IterationLimitExceeded {
            limit: self.config.max_iterations,
        }
        .into())
    }

    /// Validate, invoke and record one tool call.
    async fn run_tool(
        &self,
        call: &ToolCallRequest,
        schemas: &[ToolSchema],
        history: &mut SessionHistory,
        emitter: &EventEmitter,
    ) -> Result<(), Stop> {
        if emitter.is_cancelled() {
            return Err(Stop::Cancelled);
        }
        emitter
            .emit(DomainEvent::ToolStart {
                id: call.id.clone(),
                name: call.name.clone(),
                args: call.arguments.clone(),
            })
            .await?;

        let result = match bridge::to_rpc_invocation(call, schemas) {
            Ok(invocation) => {
                debug!(tool = %call.name, call_id = %call.id, "Invoking tool");
                until_cancelled(
                    emitter.token(),
                    self.tool_host.invoke(&call.id, invocation),
                )
                .await?
            }
            Err(rejected) => {
                warn!(tool = %call.name, call_id = %call.id, error = %rejected, "Tool call rejected");
                ToolResult::failure(
                    &call.id,
                    ToolFailure::new(rejected.kind(), rejected.to_string()),
                )
            }
        };

        let event = match &result.outcome {
            ToolOutcome::Success(payload) => DomainEvent::ToolComplete {
                id: call.id.clone(),
                name: call.name.clone(),
                result: payload.clone(),
            },
            ToolOutcome::Failure(failure) => DomainEvent::ToolError {
                id: call.id.clone(),
                name: call.name.clone(),
                error: failure.clone(),
            },
        };
        emitter.emit(event).await?;

        if let Err(e) = history.push_tool_result(&result, self.config.max_tool_result_chars) {
            // Duplicate ids in one model turn; the first result stands.
            warn!(tool = %call.name, error = %e, "Tool result not recorded");
        }
        Ok(())
    }
}

/// Await `fut` unless the run is cancelled first.
async fn until_cancelled<F: std::future::Future>(
    token: &CancellationToken,
    fut: F,
) -> Result<F::Output, Cancelled> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Cancelled),
        output = fut => Ok(output),
    }
}

/// The event stream of one chat request.
///
/// Finite: ends after `done`, or early if the request was cancelled.
pub struct ChatRun {
    request_id: uuid::Uuid,
    events: ReceiverStream<DomainEvent>,
    _guard: DropGuard,
}

impl ChatRun {
    pub fn request_id(&self) -> uuid::Uuid {
        self.request_id
    }
}

impl Stream for ChatRun {
    type Item = DomainEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}
