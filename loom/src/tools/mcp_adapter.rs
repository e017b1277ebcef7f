//! Adapts an MCP-discovered tool (reached through the injected
//! [`super::MCPManager`]) to the local [`Tool`] trait, grounded in the
//! teacher's `tools::mcp_adapter`/`tool_source::mcp` bridge pattern.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{MCPClient, Tool, ToolCallContext, ToolError, ToolSpec};

pub struct McpToolAdapter {
    spec: ToolSpec,
    client: Arc<dyn MCPClient>,
}

impl McpToolAdapter {
    pub fn new(spec: ToolSpec, client: Arc<dyn MCPClient>) -> Self {
        Self { spec, client }
    }
}

#[async_trait]
impl Tool for McpToolAdapter {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn spec(&self) -> ToolSpec {
        self.spec.clone()
    }

    async fn execute(&self, _ctx: &ToolCallContext, input: Value) -> Result<Value, ToolError> {
        self.client.call_tool(&self.spec.name, input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubClient;

    #[async_trait]
    impl MCPClient for StubClient {
        async fn list_tools(&self) -> Result<Vec<ToolSpec>, ToolError> {
            Ok(vec![])
        }
        async fn call_tool(&self, name: &str, input: Value) -> Result<Value, ToolError> {
            Ok(serde_json::json!({"tool": name, "echo": input}))
        }
    }

    #[tokio::test]
    async fn execute_delegates_to_client() {
        let spec = ToolSpec {
            name: "remote_thing".to_string(),
            description: "does a thing".to_string(),
            input_schema: serde_json::json!({}),
            backend_tag: Some("mcp:example".to_string()),
        };
        let adapter = McpToolAdapter::new(spec, Arc::new(StubClient));
        let ctx = ToolCallContext::default();
        let out = adapter.execute(&ctx, serde_json::json!({"x": 1})).await.unwrap();
        assert_eq!(out["tool"], "remote_thing");
    }
}
