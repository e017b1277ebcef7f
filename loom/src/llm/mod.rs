//! LLM provider abstraction.
//!
//! Every provider exposes the same `LlmProvider` contract: `chat` for a full
//! request/response and `chat_stream` for the SSE-style streaming path with
//! incremental tool-call input assembly. Each provider variant owns its wire
//! codec and its cost function.

mod anthropic;
mod bedrock;
mod cost;
mod gemini;
mod huggingface;
mod mistral;
mod mock;
mod ollama_compat;
mod openai_compat;
mod sse;
mod tool_name;

pub use anthropic::AnthropicProvider;
pub use bedrock::{BedrockProvider, BedrockSigner, NoopSigner};
pub use cost::Cost;
pub use gemini::GeminiProvider;
pub use huggingface::HuggingFaceProvider;
pub use mistral::MistralProvider;
pub use mock::MockProvider;
pub use ollama_compat::OllamaProvider;
pub use openai_compat::{AzureOpenAiProvider, OpenAiProvider};
pub use sse::{AnthropicSseEvent, StreamAssembler};
pub use tool_name::{restore_tool_name, sanitize_tool_name, ToolNameMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::LoomError;
use crate::message::{Message, ToolCall};

/// Why the model stopped producing output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    Error,
}

/// Token/cost accounting for one LLM call.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input: u64,
    pub output: u64,
    pub cache_read: u64,
    pub cache_creation: u64,
    pub total: u64,
    pub cost_usd: f64,
}

impl Usage {
    /// Tokens that should be charged against the rate limiter's
    /// tokens-per-minute budget: everything except cache reads/creations.
    pub fn itpm_chargeable(&self) -> u64 {
        self.input + self.output
    }
}

/// A tool definition as sent to the provider. The
/// sanitized `name` travels upstream; the agent reverses the map on the
/// response path via [`ToolNameMap`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
}

/// One full LLM response.
#[derive(Clone, Debug)]
pub struct LlmResponse {
    pub content: String,
    pub stop_reason: StopReason,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
    pub metadata: serde_json::Value,
}

/// Callback invoked once per streamed text fragment, strictly before
/// `chat_stream` returns.
pub type TokenCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Uniform contract implemented by every provider.
///
/// Both entry points take a `cancel` context: cancelling it aborts
/// admission/backoff waiting at the next checkpoint and, for `chat_stream`,
/// stops reading the SSE stream at the next event boundary, returning
/// `LoomError::ContextCancelled` rather than a partial response.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;

    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        cancel: &CancellationToken,
    ) -> Result<LlmResponse, LoomError>;

    async fn chat_stream(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        token_cb: TokenCallback,
        cancel: &CancellationToken,
    ) -> Result<LlmResponse, LoomError>;

    /// Deterministic, informational cost for a completed call. Never
    /// influences control flow.
    fn cost(&self, usage: &Usage) -> f64;
}

/// Sum-type dispatch across the eight supported provider brands.
/// Each variant is a thin newtype over its provider struct; `Provider`
/// itself implements `LlmProvider` by delegating.
pub enum Provider {
    Anthropic(AnthropicProvider),
    Bedrock(BedrockProvider),
    OpenAi(OpenAiProvider),
    AzureOpenAi(AzureOpenAiProvider),
    Gemini(GeminiProvider),
    Mistral(MistralProvider),
    Ollama(OllamaProvider),
    HuggingFace(HuggingFaceProvider),
    Mock(MockProvider),
}

#[async_trait]
impl LlmProvider for Provider {
    fn name(&self) -> &str {
        match self {
            Provider::Anthropic(p) => p.name(),
            Provider::Bedrock(p) => p.name(),
            Provider::OpenAi(p) => p.name(),
            Provider::AzureOpenAi(p) => p.name(),
            Provider::Gemini(p) => p.name(),
            Provider::Mistral(p) => p.name(),
            Provider::Ollama(p) => p.name(),
            Provider::HuggingFace(p) => p.name(),
            Provider::Mock(p) => p.name(),
        }
    }

    fn model(&self) -> &str {
        match self {
            Provider::Anthropic(p) => p.model(),
            Provider::Bedrock(p) => p.model(),
            Provider::OpenAi(p) => p.model(),
            Provider::AzureOpenAi(p) => p.model(),
            Provider::Gemini(p) => p.model(),
            Provider::Mistral(p) => p.model(),
            Provider::Ollama(p) => p.model(),
            Provider::HuggingFace(p) => p.model(),
            Provider::Mock(p) => p.model(),
        }
    }

    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        cancel: &CancellationToken,
    ) -> Result<LlmResponse, LoomError> {
        match self {
            Provider::Anthropic(p) => p.chat(messages, tools, cancel).await,
            Provider::Bedrock(p) => p.chat(messages, tools, cancel).await,
            Provider::OpenAi(p) => p.chat(messages, tools, cancel).await,
            Provider::AzureOpenAi(p) => p.chat(messages, tools, cancel).await,
            Provider::Gemini(p) => p.chat(messages, tools, cancel).await,
            Provider::Mistral(p) => p.chat(messages, tools, cancel).await,
            Provider::Ollama(p) => p.chat(messages, tools, cancel).await,
            Provider::HuggingFace(p) => p.chat(messages, tools, cancel).await,
            Provider::Mock(p) => p.chat(messages, tools, cancel).await,
        }
    }

    async fn chat_stream(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        token_cb: TokenCallback,
        cancel: &CancellationToken,
    ) -> Result<LlmResponse, LoomError> {
        match self {
            Provider::Anthropic(p) => p.chat_stream(messages, tools, token_cb, cancel).await,
            Provider::Bedrock(p) => p.chat_stream(messages, tools, token_cb, cancel).await,
            Provider::OpenAi(p) => p.chat_stream(messages, tools, token_cb, cancel).await,
            Provider::AzureOpenAi(p) => p.chat_stream(messages, tools, token_cb, cancel).await,
            Provider::Gemini(p) => p.chat_stream(messages, tools, token_cb, cancel).await,
            Provider::Mistral(p) => p.chat_stream(messages, tools, token_cb, cancel).await,
            Provider::Ollama(p) => p.chat_stream(messages, tools, token_cb, cancel).await,
            Provider::HuggingFace(p) => p.chat_stream(messages, tools, token_cb, cancel).await,
            Provider::Mock(p) => p.chat_stream(messages, tools, token_cb, cancel).await,
        }
    }

    fn cost(&self, usage: &Usage) -> f64 {
        match self {
            Provider::Anthropic(p) => p.cost(usage),
            Provider::Bedrock(p) => p.cost(usage),
            Provider::OpenAi(p) => p.cost(usage),
            Provider::AzureOpenAi(p) => p.cost(usage),
            Provider::Gemini(p) => p.cost(usage),
            Provider::Mistral(p) => p.cost(usage),
            Provider::Ollama(p) => p.cost(usage),
            Provider::HuggingFace(p) => p.cost(usage),
            Provider::Mock(p) => p.cost(usage),
        }
    }
}
