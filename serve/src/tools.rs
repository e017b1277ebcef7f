//! Handle `ToolsList` and `ToolShow` requests against the shared
//! [`loom::ToolRegistry`].

use loom::ToolRegistry;

use crate::protocol::{ErrorResponse, ServerResponse, ToolShowRequest, ToolShowResponse, ToolsListRequest, ToolsListResponse};

pub(crate) async fn handle_tools_list(r: ToolsListRequest, tools: &ToolRegistry) -> ServerResponse {
    ServerResponse::ToolsList(ToolsListResponse {
        id: r.id,
        tools: tools.list(),
    })
}

pub(crate) async fn handle_tool_show(r: ToolShowRequest, tools: &ToolRegistry) -> ServerResponse {
    let id = r.id.clone();
    match tools.get(&r.name) {
        Some(tool) => ServerResponse::ToolShow(ToolShowResponse {
            id,
            tool: Some(tool.spec()),
        }),
        None => ServerResponse::Error(ErrorResponse {
            id: Some(id),
            error: format!("tool not found: {}", r.name),
        }),
    }
}
