//! Pure state transition function
//!
//! Draft edits and sends are applied in event order. Replies are applied in
//! the order they complete, which may differ from the order of the sends.

use super::state::GenerationFailure;
use super::{ConversationState, Effect, Event, UserEvent};
use crate::llm::LlmErrorKind;
use crate::state_machine::state::RequestId;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ConversationState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: ConversationState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("No pending request {0}")]
    UnknownRequest(RequestId),
}

/// Pure transition function
///
/// Given the same state and event it always produces the same result, with no
/// I/O. The input state is never modified.
pub fn transition(
    state: &ConversationState,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match event {
        // ============================================================
        // Draft editing
        // ============================================================
        Event::User(UserEvent::UpdateDraftText { text }) => {
            let mut next = state.clone();
            next.set_draft_text(text);
            Ok(TransitionResult::new(next))
        }

        Event::User(UserEvent::UpdateDraftImage { image }) => {
            let mut next = state.clone();
            next.set_draft_image(image);
            Ok(TransitionResult::new(next))
        }

        // ============================================================
        // Sending
        // ============================================================

        // Empty prompt -> nothing happens
        Event::User(UserEvent::SendPrompt { text, .. }) if text.is_empty() => {
            Ok(TransitionResult::new(state.clone()))
        }

        Event::User(UserEvent::SendPrompt { text, image }) => {
            let mut next = state.clone();
            next.append_user_message(text.clone(), image.clone());
            next.clear_error();
            let request_id = next.begin_request(&text);
            Ok(TransitionResult::new(next)
                .with_effect(Effect::request_generation(request_id, text, image)))
        }

        // ============================================================
        // Replies
        // ============================================================
        Event::GenerationComplete { request_id, reply } => {
            let mut next = state.clone();
            let prompt = next
                .finish_request(request_id)
                .ok_or(TransitionError::UnknownRequest(request_id))?;

            // An empty reply cannot be logged, so it counts as a failure
            if reply.is_empty() {
                return Ok(fail(
                    next,
                    GenerationFailure {
                        request_id,
                        prompt,
                        kind: LlmErrorKind::EmptyResponse,
                        message: "Model returned an empty reply".to_string(),
                    },
                ));
            }

            next.append_assistant_message(reply);
            Ok(TransitionResult::new(next))
        }

        Event::GenerationFailed {
            request_id,
            kind,
            message,
        } => {
            let mut next = state.clone();
            let prompt = next
                .finish_request(request_id)
                .ok_or(TransitionError::UnknownRequest(request_id))?;
            Ok(fail(
                next,
                GenerationFailure {
                    request_id,
                    prompt,
                    kind,
                    message,
                },
            ))
        }
    }
}

fn fail(mut state: ConversationState, failure: GenerationFailure) -> TransitionResult {
    state.record_failure(failure.clone());
    TransitionResult::new(state).with_effect(Effect::NotifyFailure { failure })
}
