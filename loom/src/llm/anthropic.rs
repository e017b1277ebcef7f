//! Anthropic Messages API provider — the primary prompt-caching path.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::LoomError;
use crate::llm::cost::Cost;
use crate::llm::sse::{AnthropicSseEvent, StreamAssembler};
use crate::llm::tool_name::{sanitize_tool_name, ToolNameMap};
use crate::llm::{LlmProvider, LlmResponse, StopReason, TokenCallback, ToolDefinition, Usage};
use crate::message::{ContentBlock, ImageSource, Message, Role};
use crate::rate_limiter::{limiter_for_brand, RateLimiter, RateLimiterConfig, RateLimiterError};

const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
    max_tokens: u32,
    limiter: Arc<RateLimiter>,
    cost: Cost,
}

impl AnthropicProvider {
    pub async fn new(api_key: String, model: String) -> Self {
        let endpoint =
            std::env::var("ANTHROPIC_API_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        let limiter = limiter_for_brand("anthropic", RateLimiterConfig::for_brand("anthropic")).await;
        Self {
            client: reqwest::Client::new(),
            api_key,
            endpoint,
            model,
            max_tokens: 4096,
            limiter,
            cost: Cost::anthropic(),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Builds the request body. The last system block and the last tool
    /// definition are tagged with an ephemeral cache marker when caching is
    /// supported.
    fn build_body(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        stream: bool,
    ) -> (serde_json::Value, ToolNameMap) {
        let system_text: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .filter_map(|m| m.content.as_deref())
            .collect();
        let system = if system_text.is_empty() {
            None
        } else {
            Some(json!([{
                "type": "text",
                "text": system_text.join("\n\n"),
                "cache_control": {"type": "ephemeral"},
            }]))
        };

        let wire_messages: Vec<serde_json::Value> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(adapt_message)
            .collect();

        let map = ToolNameMap::build(tools.iter().map(|t| t.name.as_str()));
        let tool_count = tools.len();
        let wire_tools: Vec<serde_json::Value> = tools
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let mut v = json!({
                    "name": sanitize_tool_name(&t.name),
                    "description": t.description.clone().unwrap_or_default(),
                    "input_schema": t.input_schema,
                });
                if i + 1 == tool_count {
                    v["cache_control"] = json!({"type": "ephemeral"});
                }
                v
            })
            .collect();

        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": wire_messages,
            "stream": stream,
        });
        if let Some(s) = system {
            body["system"] = s;
        }
        if !wire_tools.is_empty() {
            body["tools"] = json!(wire_tools);
        }
        (body, map)
    }

    async fn send_request(
        &self,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, RateLimiterError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| RateLimiterError::classify(&e.to_string()))?;

        if resp.status().as_u16() == 429 {
            return Err(RateLimiterError::Retryable("HTTP 429".into()));
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(RateLimiterError::NonRetryable(format!(
                "HTTP {status}: {text}"
            )));
        }
        Ok(resp)
    }
}

fn adapt_message(m: &Message) -> serde_json::Value {
    match m.role {
        Role::Assistant if m.tool_calls.is_some() => {
            let mut content = Vec::new();
            if let Some(text) = &m.content {
                if !text.is_empty() {
                    content.push(json!({"type": "text", "text": text}));
                }
            }
            for call in m.tool_calls.as_ref().unwrap() {
                content.push(json!({
                    "type": "tool_use",
                    "id": call.id,
                    "name": sanitize_tool_name(&call.name),
                    "input": call.input,
                }));
            }
            json!({"role": "assistant", "content": content})
        }
        Role::Tool => json!({
            "role": "user",
            "content": [{
                "type": "tool_result",
                "tool_use_id": m.tool_use_id.clone().unwrap_or_default(),
                "content": m.content.clone().unwrap_or_default(),
            }]
        }),
        Role::User => {
            if let Some(blocks) = &m.content_blocks {
                let content: Vec<serde_json::Value> = blocks.iter().map(adapt_block).collect();
                json!({"role": "user", "content": content})
            } else {
                json!({"role": "user", "content": m.content.clone().unwrap_or_default()})
            }
        }
        Role::Assistant => {
            json!({"role": "assistant", "content": m.content.clone().unwrap_or_default()})
        }
        Role::System => unreachable!("system messages are hoisted before adapt_message is called"),
    }
}

fn adapt_block(b: &ContentBlock) -> serde_json::Value {
    match b {
        ContentBlock::Text { text } => json!({"type": "text", "text": text}),
        ContentBlock::Image { media_type, source } => match source {
            ImageSource::Base64(data) => json!({
                "type": "image",
                "source": {"type": "base64", "media_type": media_type, "data": data},
            }),
            ImageSource::Url(url) => json!({
                "type": "image",
                "source": {"type": "url", "url": url},
            }),
        },
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
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
        let (body, map) = self.build_body(messages, tools, false);
        let resp = self
            .limiter
            .r#do(cancel, || async { self.send_request(&body).await })
            .await?;
        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| LoomError::ProviderBadResponse(e.to_string()))?;
        let content = json["content"]
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b["type"] == "text")
                    .filter_map(|b| b["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        let tool_calls = json["content"]
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b["type"] == "tool_use")
                    .map(|b| crate::message::ToolCall {
                        id: b["id"].as_str().unwrap_or_default().to_string(),
                        name: map.restore(b["name"].as_str().unwrap_or_default()),
                        input: b["input"].clone(),
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        let stop_reason = match json["stop_reason"].as_str() {
            Some("end_turn") | None => StopReason::EndTurn,
            Some("tool_use") => StopReason::ToolUse,
            Some("max_tokens") => StopReason::MaxTokens,
            Some("stop_sequence") => StopReason::StopSequence,
            _ => StopReason::Error,
        };
        let mut usage = Usage {
            input: json["usage"]["input_tokens"].as_u64().unwrap_or(0),
            output: json["usage"]["output_tokens"].as_u64().unwrap_or(0),
            cache_read: json["usage"]["cache_read_input_tokens"].as_u64().unwrap_or(0),
            cache_creation: json["usage"]["cache_creation_input_tokens"]
                .as_u64()
                .unwrap_or(0),
            total: 0,
            cost_usd: 0.0,
        };
        usage.total = usage.input + usage.output;
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
        let (body, map) = self.build_body(messages, tools, true);
        let resp = self
            .limiter
            .r#do(cancel, || async { self.send_request(&body).await })
            .await?;

        let mut assembler = StreamAssembler::new();
        let mut stream = resp.bytes_stream().eventsource();
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Err(LoomError::ContextCancelled),
                next = stream.next() => next,
            };
            let Some(event) = next else { break };
            let event = event.map_err(|e| LoomError::ProviderBadResponse(e.to_string()))?;
            if event.data.trim().is_empty() || event.data == "[DONE]" {
                continue;
            }
            let parsed: AnthropicSseEvent = match serde_json::from_str(&event.data) {
                Ok(p) => p,
                Err(_) => continue,
            };
            let done = assembler.apply(parsed, &|s| token_cb(s));
            if done {
                break;
            }
        }

        let mut response = assembler.into_response();
        response.tool_calls = response
            .tool_calls
            .into_iter()
            .map(|mut c| {
                c.name = map.restore(&c.name);
                c
            })
            .collect();
        response.usage.total = response.usage.input + response.usage.output;
        response.usage.cost_usd = self.cost(&response.usage);
        self.limiter
            .record_token_usage(response.usage.itpm_chargeable())
            .await;
        Ok(response)
    }

    fn cost(&self, usage: &Usage) -> f64 {
        self.cost.compute(usage)
    }
}
