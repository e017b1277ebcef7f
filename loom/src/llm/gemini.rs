//! Google Gemini provider, via the `generateContent` / `streamGenerateContent`
//! REST surface (Gemini does not speak the OpenAI wire format, so this talks
//! `reqwest` directly rather than riding on `async-openai`).

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::LoomError;
use crate::llm::cost::Cost;
use crate::llm::tool_name::{sanitize_tool_name, ToolNameMap};
use crate::llm::{LlmProvider, LlmResponse, StopReason, TokenCallback, ToolDefinition, Usage};
use crate::message::{Message, Role};
use crate::rate_limiter::{limiter_for_brand, RateLimiter, RateLimiterConfig, RateLimiterError};

const DEFAULT_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    base: String,
    model: String,
    limiter: Arc<RateLimiter>,
    cost: Cost,
}

impl GeminiProvider {
    pub async fn new(api_key: String, model: String) -> Self {
        let base = std::env::var("GEMINI_API_BASE").unwrap_or_else(|_| DEFAULT_BASE.to_string());
        let limiter = limiter_for_brand("gemini", RateLimiterConfig::for_brand("gemini")).await;
        Self {
            client: reqwest::Client::new(),
            api_key,
            base,
            model,
            limiter,
            cost: Cost::gemini(),
        }
    }

    fn build_body(&self, messages: &[Message], tools: &[ToolDefinition]) -> (serde_json::Value, ToolNameMap) {
        let system_text: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .filter_map(|m| m.content.as_deref())
            .collect();

        let map = ToolNameMap::build(tools.iter().map(|t| t.name.as_str()));
        let contents: Vec<serde_json::Value> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                let role = match m.role {
                    Role::Assistant => "model",
                    _ => "user",
                };
                let parts = if let Some(calls) = &m.tool_calls {
                    calls
                        .iter()
                        .map(|c| json!({"functionCall": {"name": sanitize_tool_name(&c.name), "args": c.input}}))
                        .collect::<Vec<_>>()
                } else if m.role == Role::Tool {
                    vec![json!({
                        "functionResponse": {
                            "name": m.tool_use_id.clone().unwrap_or_default(),
                            "response": {"content": m.content.clone().unwrap_or_default()},
                        }
                    })]
                } else {
                    vec![json!({"text": m.content.clone().unwrap_or_default()})]
                };
                json!({"role": role, "parts": parts})
            })
            .collect();

        let mut body = json!({"contents": contents});
        if !system_text.is_empty() {
            body["systemInstruction"] = json!({"parts": [{"text": system_text.join("\n\n")}]});
        }
        if !tools.is_empty() {
            let declarations: Vec<_> = tools
                .iter()
                .map(|t| {
                    json!({
                        "name": sanitize_tool_name(&t.name),
                        "description": t.description.clone().unwrap_or_default(),
                        "parameters": t.input_schema,
                    })
                })
                .collect();
            body["tools"] = json!([{"functionDeclarations": declarations}]);
        }
        (body, map)
    }

    async fn send(&self, streaming: bool, body: &serde_json::Value) -> Result<reqwest::Response, RateLimiterError> {
        let method = if streaming { "streamGenerateContent" } else { "generateContent" };
        let mut url = format!("{}/models/{}:{}", self.base, self.model, method);
        url.push_str(&format!("?key={}", self.api_key));
        if streaming {
            url.push_str("&alt=sse");
        }
        let resp = self
            .client
            .post(url)
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
            return Err(RateLimiterError::NonRetryable(format!("HTTP {status}: {text}")));
        }
        Ok(resp)
    }

    fn parse_candidate(json: &serde_json::Value, map: &ToolNameMap) -> (String, Vec<crate::message::ToolCall>, StopReason) {
        let candidate = &json["candidates"][0];
        let parts = candidate["content"]["parts"].as_array().cloned().unwrap_or_default();
        let mut content = String::new();
        let mut tool_calls = Vec::new();
        for part in &parts {
            if let Some(text) = part["text"].as_str() {
                content.push_str(text);
            }
            if part.get("functionCall").is_some() {
                let call = &part["functionCall"];
                tool_calls.push(crate::message::ToolCall {
                    id: uuid::Uuid::new_v4().to_string(),
                    name: map.restore(call["name"].as_str().unwrap_or_default()),
                    input: call["args"].clone(),
                });
            }
        }
        let stop_reason = if !tool_calls.is_empty() {
            StopReason::ToolUse
        } else {
            match candidate["finishReason"].as_str() {
                Some("MAX_TOKENS") => StopReason::MaxTokens,
                Some("STOP") | None => StopReason::EndTurn,
                _ => StopReason::Error,
            }
        };
        (content, tool_calls, stop_reason)
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
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
        let (content, tool_calls, stop_reason) = Self::parse_candidate(&json, &map);
        let mut usage = Usage {
            input: json["usageMetadata"]["promptTokenCount"].as_u64().unwrap_or(0),
            output: json["usageMetadata"]["candidatesTokenCount"].as_u64().unwrap_or(0),
            ..Default::default()
        };
        usage.total = usage.input + usage.output;
        usage.cost_usd = self.cost(&usage);
        self.limiter.record_token_usage(usage.itpm_chargeable()).await;
        Ok(LlmResponse { content, stop_reason, tool_calls, usage, metadata: serde_json::Value::Null })
    }

    async fn chat_stream(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        token_cb: TokenCallback,
        cancel: &CancellationToken,
    ) -> Result<LlmResponse, LoomError> {
        // Gemini's SSE frames each carry a complete candidate snapshot rather
        // than incremental deltas, so each frame's *new* text suffix is
        // diffed against what has already been emitted to the callback.
        use eventsource_stream::Eventsource;
        use futures_util::StreamExt;

        let (body, map) = self.build_body(messages, tools);
        let resp = self.limiter.r#do(cancel, || async { self.send(true, &body).await }).await?;
        let mut stream = resp.bytes_stream().eventsource();
        let mut content = String::new();
        let mut tool_calls = Vec::new();
        let mut stop_reason = StopReason::EndTurn;
        let mut usage = Usage::default();

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
            let frame: serde_json::Value = match serde_json::from_str(&event.data) {
                Ok(v) => v,
                Err(_) => continue,
            };
            let (frame_content, frame_tool_calls, frame_stop) = Self::parse_candidate(&frame, &map);
            if frame_content.len() > content.len() && frame_content.starts_with(&content) {
                let delta = &frame_content[content.len()..];
                if !delta.is_empty() {
                    token_cb(delta);
                }
            }
            content = frame_content;
            if !frame_tool_calls.is_empty() {
                tool_calls = frame_tool_calls;
            }
            stop_reason = frame_stop;
            if let Some(input) = frame["usageMetadata"]["promptTokenCount"].as_u64() {
                usage.input = input;
            }
            if let Some(output) = frame["usageMetadata"]["candidatesTokenCount"].as_u64() {
                usage.output = output;
            }
        }

        usage.total = usage.input + usage.output;
        usage.cost_usd = self.cost(&usage);
        self.limiter.record_token_usage(usage.itpm_chargeable()).await;
        Ok(LlmResponse { content, stop_reason, tool_calls, usage, metadata: serde_json::Value::Null })
    }

    fn cost(&self, usage: &Usage) -> f64 {
        self.cost.compute(usage)
    }
}
