//! Events that can occur in a chat session

use crate::llm::LlmErrorKind;
use crate::state_machine::state::{ImageData, RequestId};

/// Intents delivered by the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserEvent {
    UpdateDraftText {
        text: String,
    },
    UpdateDraftImage {
        image: Option<ImageData>,
    },
    /// Send a prompt. Only the payload is used, never the current draft.
    SendPrompt {
        text: String,
        image: Option<ImageData>,
    },
}

impl UserEvent {
    pub fn update_draft_text(text: impl Into<String>) -> Self {
        UserEvent::UpdateDraftText { text: text.into() }
    }

    pub fn update_draft_image(image: Option<ImageData>) -> Self {
        UserEvent::UpdateDraftImage { image }
    }

    pub fn send_prompt(text: impl Into<String>, image: Option<ImageData>) -> Self {
        UserEvent::SendPrompt {
            text: text.into(),
            image,
        }
    }
}

/// Events that trigger state transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    // User events
    User(UserEvent),

    // Generation events, posted by the task serving `request_id`
    GenerationComplete {
        request_id: RequestId,
        reply: String,
    },
    GenerationFailed {
        request_id: RequestId,
        kind: LlmErrorKind,
        message: String,
    },
}

impl From<UserEvent> for Event {
    fn from(event: UserEvent) -> Self {
        Event::User(event)
    }
}
