//! Runtime for executing chat sessions
//!
//! One task owns the conversation state and applies events one at a time.
//! Generation requests run as separate tasks and report back through the same
//! event queue.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::SessionRuntime;
pub use traits::*;

use crate::config::ChatConfig;
use crate::state_machine::{ConversationState, Event, GenerationFailure, UserEvent};
use crate::store::ConversationStore;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Tuning for a session runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Upper bound on a single generation request
    pub request_timeout: Duration,
    /// Capacity of the event queue, at least 1
    pub event_buffer: usize,
    /// Capacity of the notice channel, at least 1
    pub notice_buffer: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            event_buffer: 32,
            notice_buffer: 64,
        }
    }
}

impl From<&ChatConfig> for SessionOptions {
    fn from(config: &ChatConfig) -> Self {
        Self {
            request_timeout: config.request_timeout,
            ..Self::default()
        }
    }
}

/// Out-of-band messages for observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    /// A request ended without a reply
    GenerationFailed(GenerationFailure),
    /// An event could not be applied
    Rejected { reason: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session has shut down")]
    Closed,
}

/// Handle to interact with a running session
pub struct SessionHandle {
    session_id: String,
    event_tx: mpsc::Sender<Event>,
    state_rx: watch::Receiver<ConversationState>,
    notice_tx: broadcast::Sender<SessionNotice>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// Start a session runtime on the current tokio runtime
    pub fn start<M>(model: M, options: SessionOptions) -> Self
    where
        M: GenerativeModel + 'static,
    {
        let session_id = uuid::Uuid::new_v4().to_string();
        let store = ConversationStore::new();
        let state_rx = store.subscribe();
        // Both channels panic on a zero capacity
        let (event_tx, event_rx) = mpsc::channel(options.event_buffer.max(1));
        let (notice_tx, _) = broadcast::channel(options.notice_buffer.max(1));
        let cancel = CancellationToken::new();

        let runtime = SessionRuntime::new(
            session_id.clone(),
            store,
            Arc::new(model),
            event_rx,
            event_tx.clone(),
            notice_tx.clone(),
            cancel.clone(),
            options.request_timeout,
        );

        let task = tokio::spawn(runtime.run());

        Self {
            session_id,
            event_tx,
            state_rx,
            notice_tx,
            cancel,
            task: Some(task),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Deliver a UI intent to the session
    pub async fn dispatch(&self, event: UserEvent) -> Result<(), SessionError> {
        if self.cancel.is_cancelled() {
            return Err(SessionError::Closed);
        }
        self.event_tx
            .send(Event::User(event))
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Latest committed state
    pub fn snapshot(&self) -> ConversationState {
        self.state_rx.borrow().clone()
    }

    /// Receiver that always holds the latest committed state
    pub fn subscribe(&self) -> watch::Receiver<ConversationState> {
        self.state_rx.clone()
    }

    /// Failure and rejection notices from now on
    pub fn notices(&self) -> broadcast::Receiver<SessionNotice> {
        self.notice_tx.subscribe()
    }

    /// Cancel in-flight requests and wait for the runtime to stop
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(session_id = %self.session_id, error = %e, "Session runtime panicked");
            }
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        // Dropping the handle ends the session
        self.cancel.cancel();
    }
}
