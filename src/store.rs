//! Observable holder for the conversation snapshot
//!
//! The session runtime is the only writer. Every commit replaces the whole
//! snapshot at once and wakes all subscribers, so readers never see a
//! half-applied update.

use crate::state_machine::ConversationState;
use tokio::sync::watch;

pub struct ConversationStore {
    tx: watch::Sender<ConversationState>,
}

impl ConversationStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ConversationState::new());
        Self { tx }
    }

    /// Clone of the current state
    pub fn snapshot(&self) -> ConversationState {
        self.tx.borrow().clone()
    }

    /// Run `f` against the current state without cloning it
    pub fn read<R>(&self, f: impl FnOnce(&ConversationState) -> R) -> R {
        f(&self.tx.borrow())
    }

    /// Replace the current state and notify subscribers
    pub fn commit(&self, state: ConversationState) {
        self.tx.send_replace(state);
    }

    /// Receiver that always holds the latest committed state
    pub fn subscribe(&self) -> watch::Receiver<ConversationState> {
        self.tx.subscribe()
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}
