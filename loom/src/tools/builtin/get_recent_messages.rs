//! `get_recent_messages(limit)` — lets the LLM re-read or summarize the
//! current conversation's tail without walking the full session transcript
//! itself.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::message::Message;
use crate::tools::{Tool, ToolCallContext, ToolError, ToolSpec};

pub const TOOL_GET_RECENT_MESSAGES: &str = "get_recent_messages";

/// Stateless: the conversation window comes from `ToolCallContext`, set by
/// the turn loop before dispatch, not from any state this tool owns.
pub struct GetRecentMessagesTool;

impl GetRecentMessagesTool {
    pub fn new() -> Self {
        Self
    }

    fn message_to_json(m: &Message) -> Value {
        json!({
            "role": m.role,
            "content": m.content,
        })
    }
}

impl Default for GetRecentMessagesTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for GetRecentMessagesTool {
    fn name(&self) -> &str {
        TOOL_GET_RECENT_MESSAGES
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_GET_RECENT_MESSAGES.to_string(),
            description: "(Optional) Get the last N messages of the current conversation. Use \
                           only when you need to explicitly re-read or summarize recent turns; \
                           most calls can omit this tool since the messages are already in \
                           context."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "limit": {
                        "type": "integer",
                        "description": "Max number of messages to return (defaults to all available)."
                    }
                }
            }),
            backend_tag: None,
        }
    }

    async fn execute(&self, ctx: &ToolCallContext, input: Value) -> Result<Value, ToolError> {
        let limit = input.get("limit").and_then(Value::as_u64).map(|n| n as usize);

        let messages = &ctx.recent_messages;
        let take = limit.unwrap_or(messages.len());
        let start = messages.len().saturating_sub(take);

        let arr: Vec<Value> = messages[start..].iter().map(Self::message_to_json).collect();
        Ok(Value::Array(arr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;

    fn ctx_with(messages: Vec<Message>) -> ToolCallContext {
        ToolCallContext {
            agent_id: "a".to_string(),
            session_id: "s".to_string(),
            recent_messages: messages,
        }
    }

    #[tokio::test]
    async fn returns_all_messages_without_limit() {
        let tool = GetRecentMessagesTool::new();
        let ctx = ctx_with(vec![Message::user("hi"), Message::assistant("hello")]);
        let out = tool.execute(&ctx, json!({})).await.unwrap();
        let arr = out.as_array().unwrap();
        assert_eq!(arr.len(), 2);
        assert_eq!(arr[0]["role"], "user");
        assert_eq!(arr[0]["content"], "hi");
    }

    #[tokio::test]
    async fn limit_takes_the_last_n() {
        let tool = GetRecentMessagesTool::new();
        let ctx = ctx_with(vec![
            Message::user("one"),
            Message::assistant("two"),
            Message::user("three"),
        ]);
        let out = tool.execute(&ctx, json!({"limit": 1})).await.unwrap();
        let arr = out.as_array().unwrap();
        assert_eq!(arr.len(), 1);
        assert_eq!(arr[0]["content"], "three");
    }

    #[tokio::test]
    async fn empty_context_returns_empty_array() {
        let tool = GetRecentMessagesTool::new();
        let ctx = ToolCallContext::default();
        let out = tool.execute(&ctx, json!({})).await.unwrap();
        assert_eq!(out.as_array().unwrap().len(), 0);
    }

    #[test]
    fn role_name_matches_constant() {
        assert_eq!(GetRecentMessagesTool::new().name(), TOOL_GET_RECENT_MESSAGES);
    }
}
