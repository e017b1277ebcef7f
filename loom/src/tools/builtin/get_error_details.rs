//! `get_error_details(id)` — lets the LLM introspect its own past failures
//! on the next turn, keyed by the error id a failed tool call returned.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::store::ErrorStore;
use crate::tools::{Tool, ToolCallContext, ToolError, ToolSpec};

pub const TOOL_GET_ERROR_DETAILS: &str = "get_error_details";

pub struct GetErrorDetailsTool {
    errors: ErrorStore,
}

impl GetErrorDetailsTool {
    pub fn new(errors: ErrorStore) -> Self {
        Self { errors }
    }
}

#[async_trait]
impl Tool for GetErrorDetailsTool {
    fn name(&self) -> &str {
        TOOL_GET_ERROR_DETAILS
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_GET_ERROR_DETAILS.to_string(),
            description: "Look up the full details of a previously recorded tool or turn-loop \
                           failure by its error id."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "id": {
                        "type": "string",
                        "description": "The error_id returned alongside a tool_failed result."
                    }
                },
                "required": ["id"]
            }),
            backend_tag: None,
        }
    }

    async fn execute(&self, _ctx: &ToolCallContext, input: Value) -> Result<Value, ToolError> {
        let id = input
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidParams("missing required field `id`".to_string()))?;
        let record = self
            .errors
            .get(id)
            .await
            .map_err(|e| ToolError::Failed(e.to_string()))?
            .ok_or_else(|| ToolError::Failed(format!("no error recorded with id {id}")))?;
        Ok(serde_json::to_value(record).map_err(|e| ToolError::Failed(e.to_string()))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[tokio::test]
    async fn returns_recorded_error_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let errors = store.errors();
        let id = errors
            .record("coder", "sess-1", 2, Some("bash"), "tool_failed", "boom", None)
            .await
            .unwrap();
        let tool = GetErrorDetailsTool::new(store.errors());
        let ctx = ToolCallContext::default();
        let out = tool.execute(&ctx, json!({"id": id})).await.unwrap();
        assert_eq!(out["message"], "boom");
    }

    #[tokio::test]
    async fn unknown_id_is_a_tool_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let tool = GetErrorDetailsTool::new(store.errors());
        let ctx = ToolCallContext::default();
        let err = tool.execute(&ctx, json!({"id": "nope"})).await.unwrap_err();
        assert!(matches!(err, ToolError::Failed(_)));
    }

    #[tokio::test]
    async fn missing_id_field_is_invalid_params() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let tool = GetErrorDetailsTool::new(store.errors());
        let ctx = ToolCallContext::default();
        let err = tool.execute(&ctx, json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidParams(_)));
    }
}
