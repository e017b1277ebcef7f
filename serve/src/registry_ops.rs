//! Handle `ListAgents`, `GetSession`, and `ReloadPrompts` requests.

use crate::agents::AgentRuntime;
use crate::protocol::{
    AgentSummary, ErrorResponse, GetSessionRequest, GetSessionResponse, ListAgentsRequest,
    ListAgentsResponse, ReloadPromptsRequest, ReloadPromptsResponse, ServerResponse,
};

pub(crate) async fn handle_list_agents(r: ListAgentsRequest, agents: &AgentRuntime) -> ServerResponse {
    let entries = agents.registry().list_configs().await;
    let agents = entries
        .into_iter()
        .map(|e| AgentSummary {
            agent_id: e.stable_id,
            name: e.name,
            description: e.config.description,
        })
        .collect();
    ServerResponse::ListAgents(ListAgentsResponse { id: r.id, agents })
}

pub(crate) async fn handle_get_session(r: GetSessionRequest, agents: &AgentRuntime) -> ServerResponse {
    let id = r.id.clone();
    let Some(name) = agents.resolve_name(&r.agent_id).await else {
        return ServerResponse::Error(ErrorResponse {
            id: Some(id),
            error: format!("unknown agent: {}", r.agent_id),
        });
    };
    let agent = match agents.get_or_build(&name).await {
        Ok(a) => a,
        Err(e) => {
            return ServerResponse::Error(ErrorResponse {
                id: Some(id),
                error: e.to_string(),
            })
        }
    };
    match agent.get_session_messages(&r.session_id).await {
        Ok(messages) => {
            let messages = messages
                .iter()
                .map(|m| serde_json::to_value(m).unwrap_or(serde_json::Value::Null))
                .collect();
            ServerResponse::GetSession(GetSessionResponse {
                id,
                session_id: r.session_id,
                messages,
            })
        }
        Err(e) => ServerResponse::Error(ErrorResponse {
            id: Some(id),
            error: e.to_string(),
        }),
    }
}

pub(crate) async fn handle_reload_prompts(r: ReloadPromptsRequest, agents: &AgentRuntime) -> ServerResponse {
    match agents.prompts().reload().await {
        Ok(()) => ServerResponse::ReloadPrompts(ReloadPromptsResponse {
            id: r.id,
            reloaded: true,
        }),
        Err(e) => ServerResponse::Error(ErrorResponse {
            id: Some(r.id),
            error: e.to_string(),
        }),
    }
}
