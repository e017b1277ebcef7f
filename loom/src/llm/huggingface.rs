//! Hugging Face Inference Providers. The router's `/v1/chat/completions`
//! endpoint is OpenAI-compatible, so this rides the same `async-openai`
//! client and adapters as [`crate::llm::openai_compat`].

use async_openai::config::OpenAIConfig;
use async_openai::types::CreateChatCompletionRequestArgs;
use async_openai::Client;
use async_trait::async_trait;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::LoomError;
use crate::llm::cost::Cost;
use crate::llm::openai_compat::{finish_to_stop_reason, to_wire_messages, to_wire_tools};
use crate::llm::{LlmProvider, LlmResponse, StopReason, TokenCallback, ToolDefinition, Usage};
use crate::message::Message;
use crate::rate_limiter::{limiter_for_brand, RateLimiter, RateLimiterConfig, RateLimiterError};

const DEFAULT_BASE: &str = "https://router.huggingface.co/v1";

pub struct HuggingFaceProvider {
    client: Client<OpenAIConfig>,
    model: String,
    limiter: Arc<RateLimiter>,
    cost: Cost,
}

impl HuggingFaceProvider {
    pub async fn new(api_key: String, model: String) -> Self {
        let base = std::env::var("HF_API_BASE").unwrap_or_else(|_| DEFAULT_BASE.to_string());
        let config = OpenAIConfig::new().with_api_base(base).with_api_key(api_key);
        let limiter = limiter_for_brand("huggingface", RateLimiterConfig::for_brand("huggingface")).await;
        Self {
            client: Client::with_config(config),
            model,
            limiter,
            cost: Cost::huggingface(),
        }
    }
}

#[async_trait]
impl LlmProvider for HuggingFaceProvider {
    fn name(&self) -> &str {
        "huggingface"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        cancel: &CancellationToken,
    ) -> Result<LlmResponse, LoomError> {
        let (wire_tools, map) = to_wire_tools(tools);
        let mut builder = CreateChatCompletionRequestArgs::default();
        builder.model(&self.model).messages(to_wire_messages(messages));
        if !wire_tools.is_empty() {
            builder.tools(wire_tools);
        }
        let request = builder.build().map_err(|e| LoomError::Internal(e.to_string()))?;

        let response = self
            .limiter
            .r#do(cancel, || async {
                self.client
                    .chat()
                    .create(request.clone())
                    .await
                    .map_err(|e| RateLimiterError::classify(&e.to_string()))
            })
            .await
            .map_err(LoomError::from)?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LoomError::ProviderBadResponse("no choices returned".into()))?;
        let content = choice.message.content.unwrap_or_default();
        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| crate::message::ToolCall {
                id: tc.id,
                name: map.restore(&tc.function.name),
                input: serde_json::from_str(&tc.function.arguments).unwrap_or_else(|_| serde_json::json!({})),
            })
            .collect();
        let stop_reason = finish_to_stop_reason(choice.finish_reason);

        let mut usage = Usage::default();
        if let Some(u) = response.usage {
            usage.input = u.prompt_tokens as u64;
            usage.output = u.completion_tokens as u64;
            usage.total = u.total_tokens as u64;
        }
        usage.cost_usd = self.cost(&usage);
        self.limiter.record_token_usage(usage.itpm_chargeable()).await;

        Ok(LlmResponse {
            content,
            stop_reason,
            tool_calls,
            usage,
            metadata: serde_json::Value::Null,
        })
    }

    async fn chat_stream(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        token_cb: TokenCallback,
        cancel: &CancellationToken,
    ) -> Result<LlmResponse, LoomError> {
        let (wire_tools, map) = to_wire_tools(tools);
        let mut builder = CreateChatCompletionRequestArgs::default();
        builder.model(&self.model).messages(to_wire_messages(messages)).stream(true);
        if !wire_tools.is_empty() {
            builder.tools(wire_tools);
        }
        let request = builder.build().map_err(|e| LoomError::Internal(e.to_string()))?;

        let mut stream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(|e| LoomError::ProviderUnavailable(e.to_string()))?;

        let mut content = String::new();
        let mut tool_fragments: std::collections::BTreeMap<u32, (String, String, String)> =
            std::collections::BTreeMap::new();
        let mut stop_reason = StopReason::EndTurn;
        let mut usage = Usage::default();

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Err(LoomError::ContextCancelled),
                next = stream.next() => next,
            };
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| LoomError::ProviderBadResponse(e.to_string()))?;
            if let Some(u) = chunk.usage {
                usage.input = u.prompt_tokens as u64;
                usage.output = u.completion_tokens as u64;
                usage.total = u.total_tokens as u64;
            }
            let Some(choice) = chunk.choices.into_iter().next() else { continue };
            if let Some(reason) = choice.finish_reason {
                stop_reason = finish_to_stop_reason(Some(reason));
            }
            if let Some(text) = choice.delta.content {
                if !text.is_empty() {
                    content.push_str(&text);
                    token_cb(&text);
                }
            }
            if let Some(deltas) = choice.delta.tool_calls {
                for d in deltas {
                    let entry = tool_fragments
                        .entry(d.index)
                        .or_insert_with(|| (String::new(), String::new(), String::new()));
                    if let Some(id) = d.id {
                        entry.0 = id;
                    }
                    if let Some(f) = &d.function {
                        if let Some(name) = &f.name {
                            entry.1 = name.clone();
                        }
                        if let Some(args) = &f.arguments {
                            entry.2.push_str(args);
                        }
                    }
                }
            }
        }

        let tool_calls = tool_fragments
            .into_values()
            .map(|(id, name, args)| crate::message::ToolCall {
                id,
                name: map.restore(&name),
                input: serde_json::from_str(&args).unwrap_or_else(|_| serde_json::json!({})),
            })
            .collect();
        if !tool_calls.is_empty() && matches!(stop_reason, StopReason::EndTurn) {
            stop_reason = StopReason::ToolUse;
        }

        usage.cost_usd = self.cost(&usage);
        self.limiter.record_token_usage(usage.itpm_chargeable()).await;

        Ok(LlmResponse {
            content,
            stop_reason,
            tool_calls,
            usage,
            metadata: serde_json::Value::Null,
        })
    }

    fn cost(&self, usage: &Usage) -> f64 {
        self.cost.compute(usage)
    }
}
