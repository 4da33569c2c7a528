//! Mock implementations for testing
//!
//! These mocks enable integration testing of the session runtime without
//! real I/O.

use super::traits::GenerativeModel;
use crate::llm::LlmError;
use crate::state_machine::ImageData;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::{oneshot, Notify};

/// What a model was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelCall {
    Text(String),
    Image { prompt: String, media_type: String },
}

// ============================================================================
// Mock Model
// ============================================================================

/// Model that answers with queued replies, in call order
pub struct MockModel {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    /// Record of all calls made
    pub calls: Mutex<Vec<ModelCall>>,
}

impl MockModel {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn queue_reply(&self, reply: impl Into<String>) {
        self.replies.lock().unwrap().push_back(Ok(reply.into()));
    }

    pub fn queue_error(&self, error: LlmError) {
        self.replies.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_calls(&self) -> Vec<ModelCall> {
        self.calls.lock().unwrap().clone()
    }

    fn next_reply(&self) -> Result<String, LlmError> {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock reply queued")))
    }
}

impl Default for MockModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerativeModel for MockModel {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        self.calls
            .lock()
            .unwrap()
            .push(ModelCall::Text(prompt.to_string()));
        self.next_reply()
    }

    async fn generate_with_image(
        &self,
        prompt: &str,
        image: &ImageData,
    ) -> Result<String, LlmError> {
        self.calls.lock().unwrap().push(ModelCall::Image {
            prompt: prompt.to_string(),
            media_type: image.media_type.clone(),
        });
        self.next_reply()
    }
}

// ============================================================================
// Gated Model (for ordering tests)
// ============================================================================

/// Model whose replies are released by the test, one prompt at a time
pub struct GatedModel {
    gates: Mutex<HashMap<String, oneshot::Receiver<Result<String, LlmError>>>>,
}

impl GatedModel {
    pub fn new() -> Self {
        Self {
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// Hold the reply to `prompt` until the returned sender fires
    pub fn gate(&self, prompt: &str) -> oneshot::Sender<Result<String, LlmError>> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().insert(prompt.to_string(), rx);
        tx
    }

    async fn wait(&self, prompt: &str) -> Result<String, LlmError> {
        let gate = self.gates.lock().unwrap().remove(prompt);
        match gate {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(LlmError::network("Gate dropped"))),
            None => Err(LlmError::unknown(format!("No gate for {prompt:?}"))),
        }
    }
}

impl Default for GatedModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerativeModel for GatedModel {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        self.wait(prompt).await
    }

    async fn generate_with_image(
        &self,
        prompt: &str,
        _image: &ImageData,
    ) -> Result<String, LlmError> {
        self.wait(prompt).await
    }
}

// ============================================================================
// Stalled Model (for timeout testing)
// ============================================================================

/// Model that never answers
pub struct StalledModel {
    /// Notified when a request starts
    pub request_started: Notify,
}

impl StalledModel {
    pub fn new() -> Self {
        Self {
            request_started: Notify::new(),
        }
    }
}

impl Default for StalledModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerativeModel for StalledModel {
    async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
        self.request_started.notify_one();
        std::future::pending().await
    }

    async fn generate_with_image(
        &self,
        _prompt: &str,
        _image: &ImageData,
    ) -> Result<String, LlmError> {
        self.request_started.notify_one();
        std::future::pending().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmErrorKind;
    use crate::runtime::{SessionError, SessionHandle, SessionNotice, SessionOptions};
    use crate::state_machine::{Author, ConversationState, Event, RequestId, UserEvent};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::{broadcast, watch};

    const WAIT: Duration = Duration::from_secs(5);

    async fn wait_for(
        rx: &mut watch::Receiver<ConversationState>,
        f: impl FnMut(&ConversationState) -> bool,
    ) -> ConversationState {
        let state = tokio::time::timeout(WAIT, rx.wait_for(f))
            .await
            .expect("timed out waiting for state")
            .expect("session closed");
        (*state).clone()
    }

    async fn next_notice(rx: &mut broadcast::Receiver<SessionNotice>) -> SessionNotice {
        tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for notice")
            .expect("notice channel closed")
    }

    fn texts(state: &ConversationState) -> Vec<(Author, String)> {
        state.log().map(|m| (m.author, m.text.clone())).collect()
    }

    #[tokio::test]
    async fn test_mock_model() {
        let model = MockModel::new();
        model.queue_reply("one");
        model.queue_error(LlmError::rate_limit("slow down"));

        assert_eq!(model.generate("a").await.unwrap(), "one");
        let image = ImageData::new(vec![0u8; 4], "image/png");
        let err = model.generate_with_image("b", &image).await.unwrap_err();
        assert_eq!(err.kind, LlmErrorKind::RateLimit);
        let err = model.generate("c").await.unwrap_err();
        assert_eq!(err.kind, LlmErrorKind::Network);

        assert_eq!(
            model.recorded_calls(),
            vec![
                ModelCall::Text("a".to_string()),
                ModelCall::Image {
                    prompt: "b".to_string(),
                    media_type: "image/png".to_string(),
                },
                ModelCall::Text("c".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_simple_exchange() {
        let model = Arc::new(MockModel::new());
        model.queue_reply("hello");
        let session = SessionHandle::start(model.clone(), SessionOptions::default());
        let mut rx = session.subscribe();

        session
            .dispatch(UserEvent::update_draft_text("hi"))
            .await
            .unwrap();
        session
            .dispatch(UserEvent::send_prompt("hi", None))
            .await
            .unwrap();

        let state = wait_for(&mut rx, |s| s.log_len() == 2).await;
        assert_eq!(
            texts(&state),
            vec![
                (Author::Assistant, "hello".to_string()),
                (Author::User, "hi".to_string()),
            ]
        );
        assert_eq!(state.draft_text(), "");
        assert!(!state.is_waiting());
        assert!(state.last_error().is_none());
        assert_eq!(model.recorded_calls(), vec![ModelCall::Text("hi".to_string())]);

        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_user_message_visible_before_reply() {
        let model = Arc::new(GatedModel::new());
        let gate = model.gate("hi");
        let session = SessionHandle::start(model, SessionOptions::default());
        let mut rx = session.subscribe();

        session
            .dispatch(UserEvent::send_prompt("hi", None))
            .await
            .unwrap();

        let state = wait_for(&mut rx, |s| s.log_len() == 1).await;
        assert!(state.latest().unwrap().is_user());
        assert!(state.is_waiting());

        gate.send(Ok("hello".to_string())).unwrap();
        let state = wait_for(&mut rx, |s| s.log_len() == 2).await;
        assert_eq!(state.latest().unwrap().text, "hello");

        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_empty_prompt_is_ignored() {
        let model = Arc::new(MockModel::new());
        let session = SessionHandle::start(model.clone(), SessionOptions::default());
        let mut rx = session.subscribe();

        session
            .dispatch(UserEvent::send_prompt("", None))
            .await
            .unwrap();
        // Events apply in order, so the marker lands after the empty send
        session
            .dispatch(UserEvent::update_draft_text("marker"))
            .await
            .unwrap();

        let state = wait_for(&mut rx, |s| s.draft_text() == "marker").await;
        assert_eq!(state.log_len(), 0);
        assert!(!state.is_waiting());
        assert!(model.recorded_calls().is_empty());

        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_image_prompt_uses_vision_call() {
        let model = Arc::new(MockModel::new());
        model.queue_reply("a cat");
        let session = SessionHandle::start(model.clone(), SessionOptions::default());
        let mut rx = session.subscribe();

        let image = ImageData::new(vec![0x89, b'P', b'N', b'G'], "image/png");
        session
            .dispatch(UserEvent::update_draft_image(Some(image.clone())))
            .await
            .unwrap();
        session
            .dispatch(UserEvent::send_prompt("what is this", Some(image.clone())))
            .await
            .unwrap();

        let state = wait_for(&mut rx, |s| s.log_len() == 2).await;
        let user = state.log().nth(1).unwrap();
        assert_eq!(user.text, "what is this");
        assert_eq!(user.image.as_ref(), Some(&image));
        assert!(state.draft_image().is_none());
        assert_eq!(
            model.recorded_calls(),
            vec![ModelCall::Image {
                prompt: "what is this".to_string(),
                media_type: "image/png".to_string(),
            }]
        );

        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_replies_logged_in_completion_order() {
        let model = Arc::new(GatedModel::new());
        let first = model.gate("first");
        let second = model.gate("second");
        let session = SessionHandle::start(model, SessionOptions::default());
        let mut rx = session.subscribe();

        session
            .dispatch(UserEvent::send_prompt("first", None))
            .await
            .unwrap();
        session
            .dispatch(UserEvent::send_prompt("second", None))
            .await
            .unwrap();
        let state = wait_for(&mut rx, |s| s.pending().len() == 2).await;
        assert_eq!(state.log_len(), 2);

        second.send(Ok("reply two".to_string())).unwrap();
        wait_for(&mut rx, |s| s.log_len() == 3).await;
        first.send(Ok("reply one".to_string())).unwrap();
        let state = wait_for(&mut rx, |s| s.log_len() == 4).await;

        assert_eq!(
            texts(&state),
            vec![
                (Author::Assistant, "reply one".to_string()),
                (Author::Assistant, "reply two".to_string()),
                (Author::User, "second".to_string()),
                (Author::User, "first".to_string()),
            ]
        );
        assert!(!state.is_waiting());

        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_failure_is_surfaced() {
        let model = Arc::new(MockModel::new());
        model.queue_error(LlmError::rate_limit("slow down"));
        model.queue_reply("better now");
        let session = SessionHandle::start(model, SessionOptions::default());
        let mut rx = session.subscribe();
        let mut notices = session.notices();

        session
            .dispatch(UserEvent::send_prompt("hi", None))
            .await
            .unwrap();

        let SessionNotice::GenerationFailed(failure) = next_notice(&mut notices).await else {
            panic!("expected a failure notice");
        };
        assert_eq!(failure.prompt, "hi");
        assert_eq!(failure.kind, LlmErrorKind::RateLimit);
        assert_eq!(failure.message, "slow down");

        // The failure is committed before the notice goes out
        let state = session.snapshot();
        assert_eq!(state.log_len(), 1);
        assert!(!state.is_waiting());
        assert_eq!(state.last_error(), Some(&failure));

        // The next send clears the error
        session
            .dispatch(UserEvent::send_prompt("again", None))
            .await
            .unwrap();
        let state = wait_for(&mut rx, |s| s.log_len() == 3).await;
        assert!(state.last_error().is_none());
        assert_eq!(state.latest().unwrap().text, "better now");

        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_empty_reply_is_a_failure() {
        let model = Arc::new(MockModel::new());
        model.queue_reply("");
        let session = SessionHandle::start(model, SessionOptions::default());
        let mut notices = session.notices();

        session
            .dispatch(UserEvent::send_prompt("hi", None))
            .await
            .unwrap();

        let SessionNotice::GenerationFailed(failure) = next_notice(&mut notices).await else {
            panic!("expected a failure notice");
        };
        assert_eq!(failure.kind, LlmErrorKind::EmptyResponse);
        assert_eq!(session.snapshot().log_len(), 1);

        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let model = Arc::new(StalledModel::new());
        let options = SessionOptions {
            request_timeout: Duration::from_millis(50),
            ..SessionOptions::default()
        };
        let session = SessionHandle::start(model.clone(), options);
        let mut notices = session.notices();

        session
            .dispatch(UserEvent::send_prompt("anyone there?", None))
            .await
            .unwrap();
        tokio::time::timeout(WAIT, model.request_started.notified())
            .await
            .expect("request never started");

        let SessionNotice::GenerationFailed(failure) = next_notice(&mut notices).await else {
            panic!("expected a failure notice");
        };
        assert_eq!(failure.kind, LlmErrorKind::Timeout);
        assert_eq!(failure.prompt, "anyone there?");
        assert!(!session.snapshot().is_waiting());

        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_completion_rejected() {
        let session = SessionHandle::start(MockModel::new(), SessionOptions::default());
        let mut notices = session.notices();
        let before = session.snapshot();

        session
            .event_tx
            .send(Event::GenerationComplete {
                request_id: RequestId(42),
                reply: "stray".to_string(),
            })
            .await
            .unwrap();

        let SessionNotice::Rejected { reason } = next_notice(&mut notices).await else {
            panic!("expected a rejection");
        };
        assert!(reason.contains("req-42"));
        assert_eq!(session.snapshot(), before);

        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_discards_late_reply() {
        let model = Arc::new(GatedModel::new());
        let gate = model.gate("hi");
        let session = SessionHandle::start(model, SessionOptions::default());
        let mut rx = session.subscribe();

        session
            .dispatch(UserEvent::send_prompt("hi", None))
            .await
            .unwrap();
        wait_for(&mut rx, ConversationState::is_waiting).await;

        session.shutdown().await;
        let _ = gate.send(Ok("too late".to_string()));

        let state = rx.borrow_and_update().clone();
        assert_eq!(state.log_len(), 1);
        // The store went away with the runtime
        assert!(rx.changed().await.is_err());
    }

    #[tokio::test]
    async fn test_zero_buffers_still_run() {
        let model = Arc::new(MockModel::new());
        model.queue_reply("hello");
        let options = SessionOptions {
            event_buffer: 0,
            notice_buffer: 0,
            ..SessionOptions::default()
        };
        let session = SessionHandle::start(model, options);
        let mut rx = session.subscribe();

        session
            .dispatch(UserEvent::send_prompt("hi", None))
            .await
            .unwrap();
        let state = wait_for(&mut rx, |s| s.log_len() == 2).await;
        assert_eq!(state.latest().unwrap().text, "hello");

        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_dispatch_after_cancel_fails() {
        let session = SessionHandle::start(MockModel::new(), SessionOptions::default());
        session.cancel.cancel();

        let result = session
            .dispatch(UserEvent::update_draft_text("hello?"))
            .await;
        assert_eq!(result, Err(SessionError::Closed));
    }
}
