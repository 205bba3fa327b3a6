//! LLM Layer
//!
//! Provider abstraction and the OpenAI-compatible chat-completions client
//! used by the note synthesizer.

pub mod openai;
pub mod provider;
pub mod types;

// Re-export key types
pub use openai::OpenAIProvider;
pub use provider::{LLMProvider, ModelMetadata};
pub use types::{
    CompletionRequest, CompletionResponse, Message, Role, ToolChoice, ToolDefinition,
    ToolInvocation, Usage,
};
