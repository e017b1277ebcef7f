//! Tool registry.
//!
//! Index of available tools — builtin plus MCP-discovered — behind one
//! [`Tool`] trait, with substring search and dynamic registration.
//!
//! MCP server process management is out of scope: the
//! registry consults an injected [`MCPManager`] only through `get_client`,
//! never spawns or supervises a server itself.

pub mod builtin;
mod mcp_adapter;
mod search;

pub use mcp_adapter::McpToolAdapter;
pub use search::{SearchIndex, SubstringIndex};

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::Message;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
    #[error("{0}")]
    Failed(String),
}

/// Tool capability record, serialized to providers as part of the request.
/// `input_schema` is the JSON-schema-shaped value
/// `{type: "object", properties: {...}, required: [...]}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_tag: Option<String>,
}

/// Per-call context available to tools during execution: which agent and
/// session are running, and the conversation tail so far.
#[derive(Clone, Debug, Default)]
pub struct ToolCallContext {
    pub agent_id: String,
    pub session_id: String,
    pub recent_messages: Vec<Message>,
}

/// A callable capability with a JSON-shaped input schema.
/// `execute` must be safe to call concurrently: the agent fans out tool
/// calls within one turn.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn spec(&self) -> ToolSpec;

    async fn execute(&self, ctx: &ToolCallContext, input: Value) -> Result<Value, ToolError>;
}

/// Consulted only through `get_client` — MCP session/transport lifecycle is
/// out of scope.
#[async_trait]
pub trait MCPManager: Send + Sync {
    async fn get_client(&self, server: &str) -> Result<Arc<dyn MCPClient>, ToolError>;
}

#[async_trait]
pub trait MCPClient: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>, ToolError>;
    async fn call_tool(&self, name: &str, input: Value) -> Result<Value, ToolError>;
}

/// Index of available tools, builtin plus MCP-discovered, with substring
/// search and dynamic registration (`RegisterTool`).
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
    search_index: Arc<dyn SearchIndex>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            search_index: Arc::new(SubstringIndex),
        }
    }

    pub fn with_search_index(search_index: Arc<dyn SearchIndex>) -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            search_index,
        }
    }

    /// Registers or replaces a tool by name (idempotent, for dynamic
    /// registration via the `RegisterTool` RPC and MCP discovery).
    pub fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.write().unwrap().insert(name, tool);
    }

    pub fn unregister(&self, name: &str) {
        self.tools.write().unwrap().remove(name);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().unwrap().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.read().unwrap().contains_key(name)
    }

    /// All registered tool specs, for building the provider-facing tool
    /// list and for `ToolsListResponse`.
    pub fn list(&self) -> Vec<ToolSpec> {
        self.tools.read().unwrap().values().map(|t| t.spec()).collect()
    }

    /// Substring (or pluggable) search over name + description — a trivial
    /// substring `SearchIndex` stands in since embedding-based search is
    /// out of scope.
    pub fn search(&self, query: &str) -> Vec<ToolSpec> {
        let specs = self.list();
        let names = self.search_index.search(&specs, query);
        let by_name: HashMap<_, _> = specs.into_iter().map(|s| (s.name.clone(), s)).collect();
        names.into_iter().filter_map(|n| by_name.get(&n).cloned()).collect()
    }

    /// Discovers tools on an MCP server through the injected manager and
    /// registers an adapter for each, restricted to the named tools if
    /// given.
    pub async fn register_mcp_server(
        &self,
        manager: &dyn MCPManager,
        server: &str,
        only: Option<&[String]>,
    ) -> Result<Vec<String>, ToolError> {
        let client = manager.get_client(server).await?;
        let specs = client.list_tools().await?;
        let mut registered = Vec::new();
        for spec in specs {
            if let Some(only) = only {
                if !only.iter().any(|n| n == &spec.name || n == "*") {
                    continue;
                }
            }
            let adapter = Arc::new(McpToolAdapter::new(spec.clone(), Arc::clone(&client)));
            self.register(adapter);
            registered.push(spec.name);
        }
        Ok(registered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: "echo".to_string(),
                description: "Echoes input back".to_string(),
                input_schema: serde_json::json!({"type": "object", "properties": {}}),
                backend_tag: None,
            }
        }
        async fn execute(&self, _ctx: &ToolCallContext, input: Value) -> Result<Value, ToolError> {
            Ok(input)
        }
    }

    #[test]
    fn register_then_get_round_trips() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        assert!(registry.contains("echo"));
        assert_eq!(registry.list().len(), 1);
    }

    #[test]
    fn unregister_removes_tool() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        registry.unregister("echo");
        assert!(!registry.contains("echo"));
    }

    #[test]
    fn search_matches_name_substring() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        assert_eq!(registry.search("ech").len(), 1);
        assert_eq!(registry.search("nope").len(), 0);
    }

    #[tokio::test]
    async fn execute_round_trips_input() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let tool = registry.get("echo").unwrap();
        let ctx = ToolCallContext::default();
        let out = tool.execute(&ctx, serde_json::json!({"x": 1})).await.unwrap();
        assert_eq!(out, serde_json::json!({"x": 1}));
    }
}
