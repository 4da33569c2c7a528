//! Effects produced by state transitions

use crate::state_machine::state::{GenerationFailure, ImageData, RequestId};

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Ask the model for a reply (spawns as background task)
    RequestGeneration {
        request_id: RequestId,
        prompt: String,
        image: Option<ImageData>,
    },

    /// Tell observers that a request produced no reply
    NotifyFailure { failure: GenerationFailure },
}

impl Effect {
    pub fn request_generation(
        request_id: RequestId,
        prompt: impl Into<String>,
        image: Option<ImageData>,
    ) -> Self {
        Effect::RequestGeneration {
            request_id,
            prompt: prompt.into(),
            image,
        }
    }
}
