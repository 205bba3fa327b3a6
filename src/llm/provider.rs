//! The Provider Abstraction.
//!
//! This trait defines the standard interface for any chat-completion
//! backend, so the synthesizer can run against OpenAI, Mistral or a fake.

use super::types::{CompletionRequest, CompletionResponse};
use anyhow::Result;
use async_trait::async_trait;

/// Metadata about a model's capabilities.
#[derive(Debug, Clone)]
pub struct ModelMetadata {
    pub id: String,
    pub context_window: usize,
}

/// The core trait for LLM interactions.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Get the model's metadata (context window, ID, etc).
    fn metadata(&self) -> ModelMetadata;

    /// Estimate the number of tokens in a string.
    fn count_tokens(&self, text: &str) -> usize {
        // Rule of thumb: 1 token ~= 4 characters
        text.len().div_ceil(4)
    }

    /// Send a chat completion request.
    async fn completion(&self, request: &CompletionRequest) -> Result<CompletionResponse>;
}
