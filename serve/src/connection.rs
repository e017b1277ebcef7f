//! WebSocket connection lifecycle: recv loop and request dispatch.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use tokio::sync::oneshot;

use crate::app::{AppState, TlsStatus};
use crate::mcp::{handle_register_tool, NoopMcpManager};
use crate::permissions::PendingPermissions;
use crate::protocol::{
    ClientRequest, ErrorResponse, PongResponse, ServerResponse, TlsStatusResponse,
};
use crate::registry_ops::{handle_get_session, handle_list_agents, handle_reload_prompts};
use crate::response::send_response;
use crate::run::handle_run;
use crate::tools::{handle_tool_show, handle_tools_list};
use crate::user_messages::handle_user_messages;

pub(crate) async fn handle_socket(
    mut socket: WebSocket,
    shutdown_tx: Option<oneshot::Sender<()>>,
    state: Arc<AppState>,
) {
    let permissions = PendingPermissions::new();
    while let Some(res) = socket.recv().await {
        let msg = match res {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("read error (client closed?): {}", e);
                let _ = socket.close().await;
                break;
            }
        };
        let text = match &msg {
            Message::Text(t) => t.clone(),
            Message::Binary(b) => String::from_utf8_lossy(b).into_owned(),
            _ => continue,
        };

        if let Err(e) = handle_request_and_send(&text, &mut socket, &state, &permissions).await {
            tracing::warn!("handle_request error: {}", e);
            let _ = socket.close().await;
            break;
        }
    }
    if let Some(tx) = shutdown_tx {
        let _ = tx.send(());
    }
}

async fn handle_request_and_send(
    text: &str,
    socket: &mut WebSocket,
    state: &Arc<AppState>,
    permissions: &PendingPermissions,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let req: ClientRequest = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => {
            let resp = ServerResponse::Error(ErrorResponse {
                id: None,
                error: format!("parse error: {}", e),
            });
            send_response(socket, &resp).await?;
            return Ok(());
        }
    };

    match req {
        ClientRequest::Run(r) => {
            if let Some(resp) = handle_run(
                r,
                socket,
                &state.agents,
                state.user_message_store.clone(),
                permissions,
                &state.run_config,
            )
            .await?
            {
                send_response(socket, &resp).await?;
            }
        }
        ClientRequest::ListAgents(r) => {
            send_response(socket, &handle_list_agents(r, &state.agents).await).await?;
        }
        ClientRequest::GetSession(r) => {
            send_response(socket, &handle_get_session(r, &state.agents).await).await?;
        }
        ClientRequest::ReloadPrompts(r) => {
            send_response(socket, &handle_reload_prompts(r, &state.agents).await).await?;
        }
        ClientRequest::TlsStatus(r) => {
            send_response(socket, &handle_tls_status(r.id, state.tls_status)).await?;
        }
        ClientRequest::RegisterTool(r) => {
            let manager = NoopMcpManager;
            send_response(
                socket,
                &handle_register_tool(r, state.agents.tools(), &manager).await,
            )
            .await?;
        }
        ClientRequest::ToolsList(r) => {
            send_response(socket, &handle_tools_list(r, state.agents.tools()).await).await?;
        }
        ClientRequest::ToolShow(r) => {
            send_response(socket, &handle_tool_show(r, state.agents.tools()).await).await?;
        }
        ClientRequest::UserMessages(r) => {
            send_response(
                socket,
                &handle_user_messages(r, state.user_message_store.clone()).await,
            )
            .await?;
        }
        ClientRequest::PermissionResponse(r) => {
            if !permissions.resolve(&r.permission_id, r.allow) {
                tracing::warn!(
                    permission_id = %r.permission_id,
                    "permission_response for unknown or already-resolved permission id"
                );
            }
        }
        ClientRequest::Ping(r) => {
            send_response(socket, &ServerResponse::Pong(PongResponse { id: r.id })).await?;
        }
    }
    Ok(())
}

fn handle_tls_status(id: String, tls: TlsStatus) -> ServerResponse {
    let detail = if tls.enabled {
        "listener is TLS-terminated".to_string()
    } else {
        "listener is plaintext".to_string()
    };
    ServerResponse::TlsStatus(TlsStatusResponse {
        id,
        enabled: tls.enabled,
        detail,
    })
}
