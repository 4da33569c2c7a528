//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the executor with mock implementations.

use crate::llm::{LlmError, LlmRequest, LlmService};
use crate::state_machine::ImageData;
use async_trait::async_trait;
use std::sync::Arc;

/// The generative AI backend as a session sees it
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Reply to a text prompt
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;

    /// Reply to a text prompt about an image
    async fn generate_with_image(&self, prompt: &str, image: &ImageData)
        -> Result<String, LlmError>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: GenerativeModel + ?Sized> GenerativeModel for Arc<T> {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        (**self).generate(prompt).await
    }

    async fn generate_with_image(
        &self,
        prompt: &str,
        image: &ImageData,
    ) -> Result<String, LlmError> {
        (**self).generate_with_image(prompt, image).await
    }
}

// ============================================================================
// Production Adapter
// ============================================================================

/// Adapter that routes text prompts and image prompts to LLM services
pub struct ServiceModel {
    text: Arc<dyn LlmService>,
    vision: Arc<dyn LlmService>,
    max_tokens: Option<u32>,
}

impl ServiceModel {
    pub fn new(text: Arc<dyn LlmService>, vision: Arc<dyn LlmService>) -> Self {
        Self {
            text,
            vision,
            max_tokens: None,
        }
    }

    /// One service for both kinds of prompt
    pub fn single(service: Arc<dyn LlmService>) -> Self {
        Self::new(service.clone(), service)
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
impl GenerativeModel for ServiceModel {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let request = LlmRequest::text(prompt).max_tokens(self.max_tokens);
        Ok(self.text.complete(&request).await?.text)
    }

    async fn generate_with_image(
        &self,
        prompt: &str,
        image: &ImageData,
    ) -> Result<String, LlmError> {
        let request = LlmRequest::with_image(prompt, image.clone()).max_tokens(self.max_tokens);
        Ok(self.vision.complete(&request).await?.text)
    }
}
