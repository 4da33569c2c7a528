//! Common types for LLM interactions

use crate::state_machine::ImageData;

/// Single-turn LLM request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmRequest {
    pub parts: Vec<ContentPart>,
    pub max_tokens: Option<u32>,
}

impl LlmRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            parts: vec![ContentPart::text(prompt)],
            max_tokens: None,
        }
    }

    /// Prompt text followed by an inline image
    pub fn with_image(prompt: impl Into<String>, image: ImageData) -> Self {
        Self {
            parts: vec![ContentPart::text(prompt), ContentPart::Image(image)],
            max_tokens: None,
        }
    }

    pub fn max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn has_image(&self) -> bool {
        self.parts
            .iter()
            .any(|part| matches!(part, ContentPart::Image(_)))
    }
}

/// Content part of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text { text: String },
    Image(ImageData),
}

impl ContentPart {
    pub fn text(s: impl Into<String>) -> Self {
        ContentPart::Text { text: s.into() }
    }
}

/// LLM response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmResponse {
    pub text: String,
    pub finish_reason: Option<String>,
    pub usage: Usage,
}

/// Usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}
