//! Provider-agnostic conversation message types.
//!
//! These types are what `Memory` stores and what `Agent::Run` assembles into
//! the next LLM call; each `llm` provider adapter translates them to its own
//! wire format.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Message role. `Tool` messages carry a `tool_use_id` back-reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One fragment of multi-part message content.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Image { media_type: String, source: ImageSource },
}

/// An image can be inlined as base64 or referenced by URL.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSource {
    Base64(String),
    Url(String),
}

/// `{id, name, input}` — a single tool invocation requested by the model
///. `input` is never `None` once serialized upstream.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// A single message in a session's log.
///
/// Invariant: exactly one of `content` / `content_blocks` /
/// `tool_calls` / `tool_use_id` carries the payload per role, except that an
/// assistant message may carry both `content` and `tool_calls`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_blocks: Option<Vec<ContentBlock>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use_id: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self::text(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::text(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text(Role::Assistant, text)
    }

    fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(text.into()),
            content_blocks: None,
            tool_calls: None,
            tool_use_id: None,
            metadata: HashMap::new(),
        }
    }

    pub fn assistant_with_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            content_blocks: None,
            tool_calls: Some(tool_calls),
            tool_use_id: None,
            metadata: HashMap::new(),
        }
    }

    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            content_blocks: None,
            tool_calls: None,
            tool_use_id: Some(tool_use_id.into()),
            metadata: HashMap::new(),
        }
    }

    /// True for an assistant message carrying one or more tool calls.
    pub fn is_tool_use(&self) -> bool {
        self.role == Role::Assistant
            && self
                .tool_calls
                .as_ref()
                .map(|t| !t.is_empty())
                .unwrap_or(false)
    }

    /// True for a `role = tool` result message.
    pub fn is_tool_result(&self) -> bool {
        self.role == Role::Tool && self.tool_use_id.is_some()
    }

    /// Rough token estimate (chars / 4), used by memory accounting and the
    /// rate limiter's ITPM budget when a provider does not report usage.
    pub fn estimated_tokens(&self) -> usize {
        let mut n = self.content.as_ref().map(|s| s.len()).unwrap_or(0);
        if let Some(blocks) = &self.content_blocks {
            for b in blocks {
                if let ContentBlock::Text { text } = b {
                    n += text.len();
                }
            }
        }
        if let Some(calls) = &self.tool_calls {
            for c in calls {
                n += c.name.len() + c.input.to_string().len();
            }
        }
        n / 4 + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assistant_with_tool_calls_is_tool_use() {
        let m = Message::assistant_with_tool_calls(
            Some("thinking".into()),
            vec![ToolCall {
                id: "1".into(),
                name: "get_weather".into(),
                input: serde_json::json!({}),
            }],
        );
        assert!(m.is_tool_use());
    }

    #[test]
    fn plain_assistant_text_is_not_tool_use() {
        let m = Message::assistant("hello");
        assert!(!m.is_tool_use());
    }

    #[test]
    fn tool_result_round_trips_through_json() {
        let m = Message::tool_result("call_1", "{\"temp\":72}");
        let json = serde_json::to_string(&m).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert!(back.is_tool_result());
        assert_eq!(back.tool_use_id.as_deref(), Some("call_1"));
    }
}
