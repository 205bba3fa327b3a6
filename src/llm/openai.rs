//! OpenAI-compatible API Provider.
//!
//! Implements the `LLMProvider` trait for the Chat Completions API. Any
//! service speaking the same protocol (Mistral, local gateways) works by
//! pointing `base_url` at it.

use super::provider::{LLMProvider, ModelMetadata};
use super::types::{
    CompletionRequest, CompletionResponse, Message, Role, ToolChoice, ToolDefinition,
    ToolInvocation, Usage,
};
use crate::config::{require_key, ReasoningConfig};
use crate::error::{PipelineError, Stage};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// OpenAI Provider configuration and state.
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    context_window: usize,
}

impl OpenAIProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
            base_url: crate::config::OPENAI_BASE_URL.to_string(),
            context_window: 128_000,
        }
    }

    /// Build from config; a missing key fails before any request is made.
    pub fn from_config(config: &ReasoningConfig) -> crate::Result<Self> {
        let api_key = require_key(&config.api_key, Stage::Synthesize, "OPENAI_API_KEY")?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                PipelineError::configuration(
                    Stage::Synthesize,
                    format!("failed to build HTTP client: {}", e),
                )
            })?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            model: config.model.clone(),
            base_url: config.base_url.clone(),
            context_window: config.context_window,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    fn metadata(&self) -> ModelMetadata {
        ModelMetadata {
            id: self.model.clone(),
            context_window: self.context_window,
        }
    }

    async fn completion(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        let body = ChatRequest::new(&self.model, request);

        tracing::debug!(
            model = %self.model,
            messages = body.messages.len(),
            tools = body.tools.len(),
            "sending chat completion"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("Failed to send request to chat completions API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "Chat completions API error ({}): {}",
                status,
                error_text
            ));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .context("Failed to parse chat completions response")?;

        let choice = chat_response
            .choices
            .into_iter()
            .next()
            .context("No choices returned from chat completions API")?;

        Ok(CompletionResponse {
            content: choice.message.content,
            tool_calls: choice
                .message
                .tool_calls
                .into_iter()
                .map(ToolInvocation::from)
                .collect(),
            usage: chat_response.usage.map(Usage::from).unwrap_or_default(),
        })
    }
}

// -----------------------------------------------------------------------------
// Wire DTOs (Data Transfer Objects)
// -----------------------------------------------------------------------------

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ApiMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<serde_json::Value>,
}

impl ChatRequest {
    fn new(model: &str, request: &CompletionRequest) -> Self {
        let tool_choice = match (&request.tool_choice, request.tools.is_empty()) {
            (_, true) => None,
            (ToolChoice::Auto, false) => Some(serde_json::json!("auto")),
            (ToolChoice::Required(name), false) => Some(serde_json::json!({
                "type": "function",
                "function": { "name": name }
            })),
        };

        Self {
            model: model.to_string(),
            messages: request.messages.iter().map(ApiMessage::from).collect(),
            temperature: request.temperature,
            tools: request.tools.iter().map(ApiTool::from).collect(),
            tool_choice,
        }
    }
}

#[derive(Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

impl From<&Message> for ApiMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: match msg.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: msg.content.clone(),
        }
    }
}

#[derive(Serialize)]
struct ApiTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: ApiFunction,
}

#[derive(Serialize)]
struct ApiFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
    strict: bool,
}

impl From<&ToolDefinition> for ApiTool {
    fn from(tool: &ToolDefinition) -> Self {
        Self {
            kind: "function",
            function: ApiFunction {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.parameters.clone(),
                strict: tool.strict,
            },
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ApiResponseMessage,
}

#[derive(Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ApiToolCall>,
}

#[derive(Deserialize)]
struct ApiToolCall {
    function: ApiFunctionCall,
}

#[derive(Deserialize)]
struct ApiFunctionCall {
    name: String,
    arguments: String,
}

impl From<ApiToolCall> for ToolInvocation {
    fn from(call: ApiToolCall) -> Self {
        Self {
            name: call.function.name,
            arguments: call.function.arguments,
        }
    }
}

#[derive(Deserialize)]
struct ApiUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
    total_tokens: usize,
}

impl From<ApiUsage> for Usage {
    fn from(u: ApiUsage) -> Self {
        Self {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}
