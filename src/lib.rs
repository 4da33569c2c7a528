//! Gemini chat - a single conversation with a generative model
//!
//! A pure state machine decides what a UI intent or model reply does to the
//! conversation. A session runtime owns that state, runs the requested
//! generations in the background and publishes every committed snapshot.

pub mod config;
pub mod llm;
pub mod runtime;
pub mod state_machine;
pub mod store;

pub use config::{ChatConfig, ConfigError};
pub use runtime::{SessionError, SessionHandle, SessionNotice, SessionOptions};
pub use state_machine::{ConversationState, ImageData, Message, UserEvent};
pub use store::ConversationStore;
