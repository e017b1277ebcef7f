//! `RegisterTool` request handling ( `RegisterTool(agent_id,
//! mcp_server, tool)`) and the [`loom::tools::MCPManager`] the façade wires
//! in for it.
//!
//! MCP server process management is explicitly out of scope for the core
//!; [`NoopMcpManager`] is the façade's stand-in until
//! an operator injects a real one, and simply reports every server as
//! unavailable.

use async_trait::async_trait;
use loom::tools::{MCPClient, MCPManager};
use loom::{ToolError, ToolRegistry};
use std::sync::Arc;

use crate::protocol::{ErrorResponse, RegisterToolRequest, RegisterToolResponse, ServerResponse};

pub(crate) struct NoopMcpManager;

#[async_trait]
impl MCPManager for NoopMcpManager {
    async fn get_client(&self, server: &str) -> Result<Arc<dyn MCPClient>, ToolError> {
        Err(ToolError::Failed(format!(
            "no MCP manager configured for server {server}"
        )))
    }
}

pub(crate) async fn handle_register_tool(
    r: RegisterToolRequest,
    tools: &ToolRegistry,
    manager: &dyn MCPManager,
) -> ServerResponse {
    tracing::debug!(agent_id = %r.agent_id, mcp_server = %r.mcp_server, "register_tool");
    let only = r.tool.map(|t| vec![t]);
    match tools
        .register_mcp_server(manager, &r.mcp_server, only.as_deref())
        .await
    {
        Ok(registered) => ServerResponse::RegisterTool(RegisterToolResponse { id: r.id, registered }),
        Err(e) => ServerResponse::Error(ErrorResponse {
            id: Some(r.id),
            error: e.to_string(),
        }),
    }
}
