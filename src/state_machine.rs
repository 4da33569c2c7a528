//! Chat session state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;


pub use effect::Effect;
pub use event::{Event, UserEvent};
pub use state::{Author, ConversationState, GenerationFailure, ImageData, Message, RequestId};
pub use transition::{transition, TransitionError, TransitionResult};
