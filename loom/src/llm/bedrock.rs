//! Amazon Bedrock provider for Anthropic-runtime models.
//!
//! Bedrock's `InvokeModelWithResponseStream` API for Anthropic models emits
//! the same `message_start`/`content_block_*`/`message_*` event shapes as
//! the native Anthropic API, so this provider reuses
//! [`StreamAssembler`] unchanged and only differs in transport: the request
//! goes to a regional Bedrock runtime endpoint, signed with AWS SigV4
//! instead of an `x-api-key` header.

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
use crate::message::{Message, Role};
use crate::rate_limiter::{limiter_for_brand, RateLimiter, RateLimiterConfig, RateLimiterError};

/// Minimal SigV4-capable request signer. The server layer is expected to
/// inject AWS credentials; Bedrock's own credential-provisioning chain is
/// out of scope for the core runtime.
pub trait BedrockSigner: Send + Sync {
    fn sign(&self, request: reqwest::RequestBuilder, body: &[u8]) -> reqwest::RequestBuilder;
}

/// No-op signer used when the caller relies on an ambient IAM role (e.g.
/// inside an EC2/ECS task) and a sidecar already adds signing headers.
pub struct NoopSigner;
impl BedrockSigner for NoopSigner {
    fn sign(&self, request: reqwest::RequestBuilder, _body: &[u8]) -> reqwest::RequestBuilder {
        request
    }
}

pub struct BedrockProvider {
    client: reqwest::Client,
    region: String,
    model: String,
    signer: Arc<dyn BedrockSigner>,
    limiter: Arc<RateLimiter>,
    cost: Cost,
}

impl BedrockProvider {
    pub async fn new(region: String, model: String, signer: Arc<dyn BedrockSigner>) -> Self {
        let limiter = limiter_for_brand("bedrock", RateLimiterConfig::for_brand("bedrock")).await;
        Self {
            client: reqwest::Client::new(),
            region,
            model,
            signer,
            limiter,
            cost: Cost::bedrock(),
        }
    }

    fn endpoint(&self, streaming: bool) -> String {
        let action = if streaming {
            "invoke-with-response-stream"
        } else {
            "invoke"
        };
        format!(
            "https://bedrock-runtime.{}.amazonaws.com/model/{}/{}",
            self.region, self.model, action
        )
    }

    fn build_body(&self, messages: &[Message], tools: &[ToolDefinition]) -> (serde_json::Value, ToolNameMap) {
        let system_text: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .filter_map(|m| m.content.as_deref())
            .collect();
        let map = ToolNameMap::build(tools.iter().map(|t| t.name.as_str()));
        let wire_messages: Vec<serde_json::Value> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| match m.role {
                Role::Tool => json!({
                    "role": "user",
                    "content": [{"type": "tool_result", "tool_use_id": m.tool_use_id, "content": m.content}],
                }),
                Role::Assistant if m.tool_calls.is_some() => {
                    let calls: Vec<_> = m
                        .tool_calls
                        .as_ref()
                        .unwrap()
                        .iter()
                        .map(|c| json!({"type": "tool_use", "id": c.id, "name": sanitize_tool_name(&c.name), "input": c.input}))
                        .collect();
                    json!({"role": "assistant", "content": calls})
                }
                _ => json!({"role": format!("{:?}", m.role).to_lowercase(), "content": m.content}),
            })
            .collect();
        let wire_tools: Vec<serde_json::Value> = tools
            .iter()
            .map(|t| json!({"name": sanitize_tool_name(&t.name), "description": t.description, "input_schema": t.input_schema}))
            .collect();
        let mut body = json!({
            "anthropic_version": "bedrock-2023-05-31",
            "max_tokens": 4096,
            "messages": wire_messages,
        });
        if !system_text.is_empty() {
            body["system"] = json!(system_text.join("\n\n"));
        }
        if !wire_tools.is_empty() {
            body["tools"] = json!(wire_tools);
        }
        (body, map)
    }

    async fn send(&self, streaming: bool, body: &serde_json::Value) -> Result<reqwest::Response, RateLimiterError> {
        let bytes = serde_json::to_vec(body).unwrap_or_default();
        let request = self
            .client
            .post(self.endpoint(streaming))
            .header("content-type", "application/json");
        let signed = self.signer.sign(request, &bytes);
        let resp = signed
            .body(bytes)
            .send()
            .await
            .map_err(|e| RateLimiterError::classify(&e.to_string()))?;
        if resp.status().as_u16() == 429 {
            return Err(RateLimiterError::Retryable("HTTP 429".into()));
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(RateLimiterError::NonRetryable(format!("HTTP {status}: {text}")));
        }
        Ok(resp)
    }
}

#[async_trait]
impl LlmProvider for BedrockProvider {
    fn name(&self) -> &str {
        "bedrock"
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
        let (body, map) = self.build_body(messages, tools);
        let resp = self.limiter.r#do(cancel, || async { self.send(false, &body).await }).await?;
        let json: serde_json::Value = resp.json().await.map_err(|e| LoomError::ProviderBadResponse(e.to_string()))?;
        let content = json["content"]
            .as_array()
            .map(|blocks| blocks.iter().filter(|b| b["type"] == "text").filter_map(|b| b["text"].as_str()).collect::<Vec<_>>().join(""))
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
        let mut usage = Usage {
            input: json["usage"]["input_tokens"].as_u64().unwrap_or(0),
            output: json["usage"]["output_tokens"].as_u64().unwrap_or(0),
            ..Default::default()
        };
        usage.total = usage.input + usage.output;
        usage.cost_usd = self.cost(&usage);
        self.limiter.record_token_usage(usage.itpm_chargeable()).await;
        let stop_reason = match json["stop_reason"].as_str() {
            Some("tool_use") => StopReason::ToolUse,
            Some("max_tokens") => StopReason::MaxTokens,
            _ => StopReason::EndTurn,
        };
        Ok(LlmResponse { content, stop_reason, tool_calls, usage, metadata: serde_json::Value::Null })
    }

    async fn chat_stream(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        token_cb: TokenCallback,
        cancel: &CancellationToken,
    ) -> Result<LlmResponse, LoomError> {
        let (body, map) = self.build_body(messages, tools);
        let resp = self.limiter.r#do(cancel, || async { self.send(true, &body).await }).await?;
        let mut assembler = StreamAssembler::new();
        let mut stream = resp.bytes_stream().eventsource();
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Err(LoomError::ContextCancelled),
                next = stream.next() => next,
            };
            let Some(event) = next else { break };
            let event = event.map_err(|e| LoomError::ProviderBadResponse(e.to_string()))?;
            if event.data.trim().is_empty() {
                continue;
            }
            let parsed: AnthropicSseEvent = match serde_json::from_str(&event.data) {
                Ok(p) => p,
                Err(_) => continue,
            };
            if assembler.apply(parsed, &|s| token_cb(s)) {
                break;
            }
        }
        let mut response = assembler.into_response();
        response.tool_calls = response.tool_calls.into_iter().map(|mut c| { c.name = map.restore(&c.name); c }).collect();
        response.usage.total = response.usage.input + response.usage.output;
        response.usage.cost_usd = self.cost(&response.usage);
        self.limiter.record_token_usage(response.usage.itpm_chargeable()).await;
        Ok(response)
    }

    fn cost(&self, usage: &Usage) -> f64 {
        self.cost.compute(usage)
    }
}
