//! Wire request/response shapes for the `serve` façade. One JSON object per line over the WebSocket; `id` on a
//! request is echoed back on its response(s) so a client can correlate
//! concurrent in-flight calls.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    Run(RunRequest),
    ListAgents(ListAgentsRequest),
    GetSession(GetSessionRequest),
    ReloadPrompts(ReloadPromptsRequest),
    TlsStatus(TlsStatusRequest),
    RegisterTool(RegisterToolRequest),
    ToolsList(ToolsListRequest),
    ToolShow(ToolShowRequest),
    UserMessages(UserMessagesRequest),
    PermissionResponse(PermissionResponseRequest),
    Ping(PingRequest),
}

/// `Run(agent_id, session_id, user_input) stream (ProgressEvent)*`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunRequest {
    pub id: String,
    pub agent_id: String,
    pub session_id: Option<String>,
    pub message: String,
    /// When set, the run's initial user message and the transcript of new
    /// messages produced are appended to the user-message store under this
    /// thread (distinct from `session_id`, which selects the agent's L1/L2
    /// memory).
    pub thread_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ListAgentsRequest {
    pub id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GetSessionRequest {
    pub id: String,
    pub agent_id: String,
    pub session_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReloadPromptsRequest {
    pub id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TlsStatusRequest {
    pub id: String,
}

/// `RegisterTool(agent_id, mcp_server, tool)`. `tool` restricts
/// registration to that tool name (or `"*"` for all tools on the server)
/// when set; `None` registers every tool the server exposes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegisterToolRequest {
    pub id: String,
    pub agent_id: String,
    pub mcp_server: String,
    pub tool: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsListRequest {
    pub id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolShowRequest {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserMessagesRequest {
    pub id: String,
    pub thread_id: String,
    pub before: Option<u64>,
    pub limit: Option<u32>,
}

/// Client reply to a streamed `PermissionRequested` event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PermissionResponseRequest {
    pub permission_id: String,
    pub allow: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PingRequest {
    pub id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerResponse {
    RunStreamEvent(RunStreamEventResponse),
    RunEnd(RunEndResponse),
    ListAgents(ListAgentsResponse),
    GetSession(GetSessionResponse),
    ReloadPrompts(ReloadPromptsResponse),
    TlsStatus(TlsStatusResponse),
    RegisterTool(RegisterToolResponse),
    ToolsList(ToolsListResponse),
    ToolShow(ToolShowResponse),
    UserMessages(UserMessagesResponse),
    Pong(PongResponse),
    Error(ErrorResponse),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunStreamEventResponse {
    pub id: String,
    pub event: Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunEndResponse {
    pub id: String,
    pub content: String,
    pub stop_reason: String,
    pub error: Option<String>,
    pub truncated: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentSummary {
    pub agent_id: String,
    pub name: String,
    pub description: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ListAgentsResponse {
    pub id: String,
    pub agents: Vec<AgentSummary>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GetSessionResponse {
    pub id: String,
    pub session_id: String,
    pub messages: Vec<Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReloadPromptsResponse {
    pub id: String,
    pub reloaded: bool,
}

/// TLS certificate provisioning is out of scope; this endpoint
/// only reports whether the listener the server is bound to is a `wss://`
/// (TLS-terminated) one.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TlsStatusResponse {
    pub id: String,
    pub enabled: bool,
    pub detail: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegisterToolResponse {
    pub id: String,
    pub registered: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsListResponse {
    pub id: String,
    pub tools: Vec<loom::ToolSpec>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolShowResponse {
    pub id: String,
    pub tool: Option<loom::ToolSpec>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserMessageItem {
    pub role: String,
    pub content: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserMessagesResponse {
    pub id: String,
    pub thread_id: String,
    pub messages: Vec<UserMessageItem>,
    pub has_more: Option<bool>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PongResponse {
    pub id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub id: Option<String>,
    pub error: String,
}
