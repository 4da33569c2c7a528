//! Conversation state types

use crate::llm::LlmErrorKind;
use base64::Engine;
use bytes::Bytes;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Messages
// ============================================================================

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Author {
    User,
    Assistant,
}

/// Image attached to a prompt
///
/// The bytes are reference-counted, so cloning a snapshot never copies pixels.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageData {
    pub bytes: Bytes,
    pub media_type: String,
}

impl ImageData {
    pub fn new(bytes: impl Into<Bytes>, media_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            media_type: media_type.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Standard base64 encoding of the raw bytes
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }
}

impl fmt::Debug for ImageData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageData")
            .field("media_type", &self.media_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// One entry in the conversation log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub text: String,
    pub image: Option<ImageData>,
    pub author: Author,
}

impl Message {
    pub fn user(text: impl Into<String>, image: Option<ImageData>) -> Self {
        Self {
            text: text.into(),
            image,
            author: Author::User,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image: None,
            author: Author::Assistant,
        }
    }

    pub fn is_user(&self) -> bool {
        self.author == Author::User
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Identifies one generation request within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// A generation request that ended without a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationFailure {
    pub request_id: RequestId,
    /// The prompt that went unanswered
    pub prompt: String,
    pub kind: LlmErrorKind,
    pub message: String,
}

// ============================================================================
// Conversation State
// ============================================================================

/// Full observable snapshot of a chat session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationState {
    /// Newest first
    log: VecDeque<Arc<Message>>,
    draft_text: String,
    draft_image: Option<ImageData>,
    /// Requests whose reply has not arrived yet, keyed to their prompts
    pending: BTreeMap<RequestId, String>,
    last_error: Option<GenerationFailure>,
    next_request_id: u64,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Conversation log, newest entry first
    pub fn log(&self) -> impl ExactSizeIterator<Item = &Message> + DoubleEndedIterator {
        self.log.iter().map(|m| &**m)
    }

    pub fn log_len(&self) -> usize {
        self.log.len()
    }

    /// The most recently inserted message
    pub fn latest(&self) -> Option<&Message> {
        self.log.front().map(|m| &**m)
    }

    pub fn draft_text(&self) -> &str {
        &self.draft_text
    }

    pub fn draft_image(&self) -> Option<&ImageData> {
        self.draft_image.as_ref()
    }

    pub fn pending(&self) -> impl ExactSizeIterator<Item = RequestId> + '_ {
        self.pending.keys().copied()
    }

    pub fn is_pending(&self, request_id: RequestId) -> bool {
        self.pending.contains_key(&request_id)
    }

    /// Whether any reply is still outstanding
    pub fn is_waiting(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn last_error(&self) -> Option<&GenerationFailure> {
        self.last_error.as_ref()
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    pub fn set_draft_text(&mut self, text: impl Into<String>) {
        self.draft_text = text.into();
    }

    pub fn set_draft_image(&mut self, image: Option<ImageData>) {
        self.draft_image = image;
    }

    /// Log a user prompt and clear the draft in the same step.
    ///
    /// Callers must not pass empty text.
    pub fn append_user_message(&mut self, text: impl Into<String>, image: Option<ImageData>) {
        let text = text.into();
        debug_assert!(!text.is_empty(), "user messages must not be empty");
        self.log.push_front(Arc::new(Message::user(text, image)));
        self.draft_text.clear();
        self.draft_image = None;
    }

    pub fn append_assistant_message(&mut self, text: impl Into<String>) {
        self.log.push_front(Arc::new(Message::assistant(text)));
    }

    /// Allocate an id for a new generation request and mark it pending
    pub(crate) fn begin_request(&mut self, prompt: &str) -> RequestId {
        let request_id = RequestId(self.next_request_id);
        self.next_request_id += 1;
        self.pending.insert(request_id, prompt.to_string());
        request_id
    }

    /// Clear a pending request, returning its prompt if it was pending
    pub(crate) fn finish_request(&mut self, request_id: RequestId) -> Option<String> {
        self.pending.remove(&request_id)
    }

    pub(crate) fn record_failure(&mut self, failure: GenerationFailure) {
        self.last_error = Some(failure);
    }

    pub(crate) fn clear_error(&mut self) {
        self.last_error = None;
    }
}
