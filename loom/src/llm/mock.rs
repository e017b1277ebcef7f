//! Deterministic in-process provider used by agent-loop tests:
//! a fixed queue of canned [`LlmResponse`]s, returned one per call in order,
//! with no network I/O and no rate limiting.

use async_trait::async_trait;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::LoomError;
use crate::llm::{LlmProvider, LlmResponse, StopReason, TokenCallback, ToolDefinition, Usage};
use crate::message::{Message, ToolCall};

pub struct MockProvider {
    model: String,
    responses: Mutex<Vec<LlmResponse>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl MockProvider {
    /// Builds a provider that yields `responses` in order, one per `chat`/
    /// `chat_stream` call. Panics on the `N+1`th call past the queue's end —
    /// callers size the queue to the number of turns their test expects.
    pub fn new(responses: Vec<LlmResponse>) -> Self {
        Self {
            model: "mock-1".to_string(),
            responses: Mutex::new(responses),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Convenience constructor for a single-turn plain-text reply.
    pub fn with_text_reply(text: impl Into<String>) -> Self {
        Self::new(vec![LlmResponse {
            content: text.into(),
            stop_reason: StopReason::EndTurn,
            tool_calls: Vec::new(),
            usage: Usage::default(),
            metadata: serde_json::Value::Null,
        }])
    }

    /// Convenience constructor for a single-turn tool-call response.
    pub fn with_tool_call(name: impl Into<String>, input: serde_json::Value) -> Self {
        Self::new(vec![LlmResponse {
            content: String::new(),
            stop_reason: StopReason::ToolUse,
            tool_calls: vec![ToolCall {
                id: "call_0".to_string(),
                name: name.into(),
                input,
            }],
            usage: Usage::default(),
            metadata: serde_json::Value::Null,
        }])
    }

    /// The message history passed to each recorded call, in call order —
    /// lets a test assert on what the agent actually sent upstream.
    pub fn recorded_calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().unwrap().clone()
    }

    fn next_response(&self, messages: &[Message]) -> Result<LlmResponse, LoomError> {
        self.calls.lock().unwrap().push(messages.to_vec());
        let mut queue = self.responses.lock().unwrap();
        if queue.is_empty() {
            return Err(LoomError::ProviderBadResponse(
                "mock provider response queue exhausted".into(),
            ));
        }
        Ok(queue.remove(0))
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        messages: &[Message],
        _tools: &[ToolDefinition],
        _cancel: &CancellationToken,
    ) -> Result<LlmResponse, LoomError> {
        self.next_response(messages)
    }

    async fn chat_stream(
        &self,
        messages: &[Message],
        _tools: &[ToolDefinition],
        token_cb: TokenCallback,
        _cancel: &CancellationToken,
    ) -> Result<LlmResponse, LoomError> {
        let response = self.next_response(messages)?;
        if !response.content.is_empty() {
            token_cb(&response.content);
        }
        Ok(response)
    }

    fn cost(&self, _usage: &Usage) -> f64 {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn yields_queued_responses_in_order() {
        let provider = MockProvider::new(vec![
            LlmResponse {
                content: "first".into(),
                stop_reason: StopReason::EndTurn,
                tool_calls: vec![],
                usage: Usage::default(),
                metadata: serde_json::Value::Null,
            },
            LlmResponse {
                content: "second".into(),
                stop_reason: StopReason::EndTurn,
                tool_calls: vec![],
                usage: Usage::default(),
                metadata: serde_json::Value::Null,
            },
        ]);
        let messages = vec![Message::user("hi")];
        let cancel = CancellationToken::new();
        let first = provider.chat(&messages, &[], &cancel).await.unwrap();
        let second = provider.chat(&messages, &[], &cancel).await.unwrap();
        assert_eq!(first.content, "first");
        assert_eq!(second.content, "second");
        assert_eq!(provider.recorded_calls().len(), 2);
    }

    #[tokio::test]
    async fn exhausted_queue_is_a_provider_error() {
        let provider = MockProvider::with_text_reply("only one");
        let messages = vec![Message::user("hi")];
        let cancel = CancellationToken::new();
        provider.chat(&messages, &[], &cancel).await.unwrap();
        let err = provider.chat(&messages, &[], &cancel).await.unwrap_err();
        assert!(matches!(err, LoomError::ProviderBadResponse(_)));
    }
}
