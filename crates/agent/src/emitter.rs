//! Event stream emitter.
//!
//! Carries [`DomainEvent`]s from the loop to whoever consumes the request
//! (an SSE response, the CLI). The channel is bounded: a slow consumer
//! suspends the loop at its next emit. A consumer that goes away cancels
//! the run.

use railchat_core::DomainEvent;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// The consumer is gone or the run was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("event stream cancelled")]
pub struct Cancelled;

pub struct EventEmitter {
    tx: mpsc::Sender<DomainEvent>,
    token: CancellationToken,
}

impl EventEmitter {
    /// Create an emitter and the receiving end of its channel.
    pub fn channel(
        capacity: usize,
        token: CancellationToken,
    ) -> (Self, mpsc::Receiver<DomainEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, token }, rx)
    }

    /// Deliver one event, waiting for channel capacity.
    pub async fn emit(&self, event: DomainEvent) -> Result<(), Cancelled> {
        if self.token.is_cancelled() {
            return Err(Cancelled);
        }
        trace!(event = event.event_type(), "Emitting event");

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Cancelled),
            sent = self.tx.send(event) => sent.map_err(|_| {
                self.token.cancel();
                Cancelled
            }),
        }
    }

    /// Emit the optional error, then the terminal `done`.
    ///
    /// Consumes the emitter so nothing can follow `done`.
    pub async fn finish(self, error: Option<String>) {
        if let Some(message) = error {
            if self.emit(DomainEvent::Error { message }).await.is_err() {
                return;
            }
        }
        let _ = self.emit(DomainEvent::Done).await;
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.tx.is_closed()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}
