//! Anthropic Messages API SSE event model and streaming state machine.
//!
//! `Bedrock`'s Anthropic-runtime models emit the same event shapes, so
//! [`StreamAssembler`] is reused unchanged by both providers.

use serde::Deserialize;
use std::collections::HashMap;

use crate::llm::{LlmResponse, StopReason, Usage};
use crate::message::ToolCall;

/// One decoded SSE event from the Anthropic Messages streaming API.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicSseEvent {
    MessageStart {
        message: MessageStartPayload,
    },
    ContentBlockStart {
        index: usize,
        content_block: ContentBlockStart,
    },
    ContentBlockDelta {
        index: usize,
        delta: ContentBlockDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        delta: MessageDeltaPayload,
        #[serde(default)]
        usage: Option<MessageDeltaUsage>,
    },
    MessageStop,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub struct MessageStartPayload {
    #[serde(default)]
    pub usage: StartUsage,
}

#[derive(Debug, Default, Deserialize)]
pub struct StartUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlockStart {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlockDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub struct MessageDeltaPayload {
    #[serde(default)]
    pub stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MessageDeltaUsage {
    #[serde(default)]
    pub output_tokens: u64,
}

/// Accumulates one streaming response, tracking per-index JSON buffers for
/// tool-use blocks exactly as the SSE event stream requires: fragments
/// are reunited only within their own content-block index, never across
/// indices, and a buffer that fails to parse at `content_block_stop`
/// defaults its tool input to `{}`.
#[derive(Default)]
pub struct StreamAssembler {
    content: String,
    tool_calls: Vec<ToolCall>,
    /// index -> (tool_call position in `tool_calls`, json buffer)
    tool_buffers: HashMap<usize, (usize, String)>,
    usage: Usage,
    stop_reason: StopReason,
    cancelled: bool,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self {
            stop_reason: StopReason::EndTurn,
            ..Default::default()
        }
    }

    /// Marks the stream as cancelled; the next `apply` call becomes a no-op
    /// so the scan can abort at the next event boundary.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Applies one event, invoking `token_cb` for text deltas. Returns
    /// `true` once `message_stop` has been processed.
    pub fn apply(&mut self, event: AnthropicSseEvent, token_cb: &dyn Fn(&str)) -> bool {
        if self.cancelled {
            return true;
        }
        match event {
            AnthropicSseEvent::MessageStart { message } => {
                self.usage.input = message.usage.input_tokens;
                self.usage.cache_read = message.usage.cache_read_input_tokens;
                self.usage.cache_creation = message.usage.cache_creation_input_tokens;
            }
            AnthropicSseEvent::ContentBlockStart {
                index,
                content_block,
            } => match content_block {
                ContentBlockStart::Text { text } => {
                    if !text.is_empty() {
                        self.content.push_str(&text);
                        token_cb(&text);
                    }
                }
                ContentBlockStart::ToolUse { id, name } => {
                    let pos = self.tool_calls.len();
                    self.tool_calls.push(ToolCall {
                        id,
                        name,
                        input: serde_json::Value::Object(Default::default()),
                    });
                    self.tool_buffers.insert(index, (pos, String::new()));
                }
                ContentBlockStart::Unknown => {}
            },
            AnthropicSseEvent::ContentBlockDelta { index, delta } => match delta {
                ContentBlockDelta::TextDelta { text } => {
                    self.content.push_str(&text);
                    token_cb(&text);
                }
                ContentBlockDelta::InputJsonDelta { partial_json } => {
                    if let Some((_, buf)) = self.tool_buffers.get_mut(&index) {
                        buf.push_str(&partial_json);
                    }
                }
                ContentBlockDelta::Unknown => {}
            },
            AnthropicSseEvent::ContentBlockStop { index } => {
                if let Some((pos, buf)) = self.tool_buffers.remove(&index) {
                    let parsed: serde_json::Value =
                        serde_json::from_str(&buf).unwrap_or_else(|_| serde_json::json!({}));
                    if let Some(call) = self.tool_calls.get_mut(pos) {
                        call.input = parsed;
                    }
                }
            }
            AnthropicSseEvent::MessageDelta { delta, usage } => {
                if let Some(reason) = delta.stop_reason {
                    self.stop_reason = map_stop_reason(&reason);
                }
                if let Some(u) = usage {
                    self.usage.output = u.output_tokens;
                }
            }
            AnthropicSseEvent::MessageStop => {
                self.usage.total = self.usage.input + self.usage.output;
                return true;
            }
            AnthropicSseEvent::Unknown => {}
        }
        false
    }

    pub fn into_response(self) -> LlmResponse {
        LlmResponse {
            content: self.content,
            stop_reason: self.stop_reason,
            tool_calls: self.tool_calls,
            usage: self.usage,
            metadata: serde_json::Value::Null,
        }
    }
}

fn map_stop_reason(raw: &str) -> StopReason {
    match raw {
        "end_turn" | "stop" => StopReason::EndTurn,
        "tool_use" => StopReason::ToolUse,
        "max_tokens" => StopReason::MaxTokens,
        "stop_sequence" => StopReason::StopSequence,
        _ => StopReason::Error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(json: &str) -> AnthropicSseEvent {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn text_deltas_accumulate_and_reach_token_cb_in_order() {
        let mut assembler = StreamAssembler::new();
        let mut seen = Vec::new();
        let cb = |s: &str| seen.push(s.to_string());

        assembler.apply(
            ev(r#"{"type":"message_start","message":{"usage":{"input_tokens":10}}}"#),
            &cb,
        );
        assembler.apply(
            ev(r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#),
            &cb,
        );
        assembler.apply(
            ev(r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi "}}"#),
            &cb,
        );
        assembler.apply(
            ev(r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"there"}}"#),
            &cb,
        );
        assembler.apply(ev(r#"{"type":"content_block_stop","index":0}"#), &cb);
        assembler.apply(
            ev(r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":5}}"#),
            &cb,
        );
        let done = assembler.apply(ev(r#"{"type":"message_stop"}"#), &cb);

        assert!(done);
        assert_eq!(seen, vec!["Hi ".to_string(), "there".to_string()]);
        let resp = assembler.into_response();
        assert_eq!(resp.content, "Hi there");
        assert_eq!(resp.stop_reason, StopReason::EndTurn);
        assert_eq!(resp.usage.input, 10);
        assert_eq!(resp.usage.output, 5);
    }

    #[test]
    fn tool_input_json_fragments_reunite_by_index_only() {
        let mut assembler = StreamAssembler::new();
        let cb = |_: &str| {};

        assembler.apply(
            ev(r#"{"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"t1","name":"get_weather"}}"#),
            &cb,
        );
        assembler.apply(
            ev(r#"{"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"t2","name":"get_time"}}"#),
            &cb,
        );
        // Interleaved fragments across two indices must not cross-contaminate.
        assembler.apply(
            ev(r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{\"city\":"}}"#),
            &cb,
        );
        assembler.apply(
            ev(r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"tz\":"}}"#),
            &cb,
        );
        assembler.apply(
            ev(r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"\"SF\"}"}}"#),
            &cb,
        );
        assembler.apply(
            ev(r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"\"UTC\"}"}}"#),
            &cb,
        );
        assembler.apply(ev(r#"{"type":"content_block_stop","index":0}"#), &cb);
        assembler.apply(ev(r#"{"type":"content_block_stop","index":1}"#), &cb);

        let resp = assembler.into_response();
        assert_eq!(resp.tool_calls[0].name, "get_weather");
        assert_eq!(resp.tool_calls[0].input, serde_json::json!({"city": "SF"}));
        assert_eq!(resp.tool_calls[1].name, "get_time");
        assert_eq!(resp.tool_calls[1].input, serde_json::json!({"tz": "UTC"}));
    }

    #[test]
    fn malformed_json_buffer_defaults_to_empty_object() {
        let mut assembler = StreamAssembler::new();
        let cb = |_: &str| {};
        assembler.apply(
            ev(r#"{"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"t1","name":"broken"}}"#),
            &cb,
        );
        assembler.apply(
            ev(r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{not valid"}}"#),
            &cb,
        );
        assembler.apply(ev(r#"{"type":"content_block_stop","index":0}"#), &cb);
        let resp = assembler.into_response();
        assert_eq!(resp.tool_calls[0].input, serde_json::json!({}));
    }

    #[test]
    fn cancel_short_circuits_subsequent_apply_calls() {
        let mut assembler = StreamAssembler::new();
        let cb = |_: &str| {};
        assembler.apply(
            ev(r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":"partial"}}"#),
            &cb,
        );
        assembler.cancel();
        let done = assembler.apply(ev(r#"{"type":"message_stop"}"#), &cb);
        assert!(done);
    }
}
