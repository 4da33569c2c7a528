//! Session runtime executor

use super::traits::GenerativeModel;
use super::SessionNotice;

use crate::llm::{LlmError, LlmErrorKind};
use crate::state_machine::{transition, Effect, Event, ImageData, RequestId};
use crate::store::ConversationStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

/// Generic session runtime that can work with any model implementation
pub struct SessionRuntime<M>
where
    M: GenerativeModel + 'static,
{
    session_id: String,
    store: ConversationStore,
    model: Arc<M>,
    event_rx: mpsc::Receiver<Event>,
    event_tx: mpsc::Sender<Event>,
    notice_tx: broadcast::Sender<SessionNotice>,
    /// Cancelled when the session is torn down
    cancel: CancellationToken,
    request_timeout: Duration,
}

impl<M> SessionRuntime<M>
where
    M: GenerativeModel + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: String,
        store: ConversationStore,
        model: Arc<M>,
        event_rx: mpsc::Receiver<Event>,
        event_tx: mpsc::Sender<Event>,
        notice_tx: broadcast::Sender<SessionNotice>,
        cancel: CancellationToken,
        request_timeout: Duration,
    ) -> Self {
        Self {
            session_id,
            store,
            model,
            event_rx,
            event_tx,
            notice_tx,
            cancel,
            request_timeout,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(session_id = %self.session_id, "Starting session runtime");

        // Process events in a loop until the session is torn down
        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => break,

                Some(event) = self.event_rx.recv() => {
                    self.process_event(event);
                }

                else => break,
            }
        }

        tracing::info!(
            session_id = %self.session_id,
            pending = self.store.read(|s| s.pending().len()),
            "Session runtime stopped"
        );
    }

    fn process_event(&self, event: Event) {
        // Pure state transition
        let result = match self.store.read(|state| transition(state, event)) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, error = %e, "Event rejected");
                let _ = self.notice_tx.send(SessionNotice::Rejected {
                    reason: e.to_string(),
                });
                return;
            }
        };

        // Commit before running effects so observers see the user message
        // ahead of any reply
        self.store.commit(result.new_state);

        for effect in result.effects {
            self.execute_effect(effect);
        }
    }

    fn execute_effect(&self, effect: Effect) {
        match effect {
            Effect::RequestGeneration {
                request_id,
                prompt,
                image,
            } => self.spawn_generation(request_id, prompt, image),

            Effect::NotifyFailure { failure } => {
                tracing::warn!(
                    session_id = %self.session_id,
                    request_id = %failure.request_id,
                    kind = %failure.kind,
                    error = %failure.message,
                    "Generation failed"
                );
                let _ = self
                    .notice_tx
                    .send(SessionNotice::GenerationFailed(failure));
            }
        }
    }

    /// Run one generation request as a background task
    fn spawn_generation(&self, request_id: RequestId, prompt: String, image: Option<ImageData>) {
        let model = self.model.clone();
        let event_tx = self.event_tx.clone();
        let cancel = self.cancel.clone();
        let timeout = self.request_timeout;
        let session_id = self.session_id.clone();

        tokio::spawn(async move {
            tracing::info!(
                session_id = %session_id,
                request_id = %request_id,
                with_image = image.is_some(),
                "Requesting generation (background)"
            );

            let generation = async {
                match &image {
                    Some(image) => model.generate_with_image(&prompt, image).await,
                    None => model.generate(&prompt).await,
                }
            };

            // Race the request against session teardown
            let outcome = tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    tracing::debug!(request_id = %request_id, "Generation cancelled");
                    return;
                }

                outcome = tokio::time::timeout(timeout, generation) => outcome,
            };

            let event = match outcome {
                Ok(Ok(reply)) => Event::GenerationComplete { request_id, reply },
                Ok(Err(LlmError { kind, message })) => Event::GenerationFailed {
                    request_id,
                    kind,
                    message,
                },
                Err(_) => Event::GenerationFailed {
                    request_id,
                    kind: LlmErrorKind::Timeout,
                    message: format!("No reply within {}s", timeout.as_secs_f32()),
                },
            };

            // The runtime may already be gone
            let _ = event_tx.send(event).await;
        });
    }
}
