//! Handle `Run` request: resolve the agent, run one turn, and stream
//! progress events + the terminal `RunEnd` over the WebSocket (
//! `Run(agent_id, session_id, user_input) stream (ProgressEvent)*`).
//!
//! Flow: resolve + build the agent, append the initial user message to the
//! thread store if configured, spawn the turn → consume the event channel
//! and forward it over the socket → send `RunEnd`.

mod delivery;
mod request;
mod stream;

use std::sync::Arc;

use axum::extract::ws::WebSocket;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::agents::AgentRuntime;
use crate::app::RunConfig;
use crate::permissions::PendingPermissions;
use crate::protocol::{ErrorResponse, RunRequest, ServerResponse};

/// Entry point for a `Run` request. Returns `Ok(None)` in the normal
/// streaming case (response already sent over `socket`); returns `Err` if
/// streaming or sending the final response fails.
pub(crate) async fn handle_run(
    r: RunRequest,
    socket: &mut WebSocket,
    agents: &AgentRuntime,
    user_message_store: Option<Arc<dyn loom::UserMessageStore>>,
    permissions: &PendingPermissions,
    run_config: &RunConfig,
) -> Result<Option<ServerResponse>, Box<dyn std::error::Error + Send + Sync>> {
    let run_id = r.id.clone();

    let Some(name) = agents.resolve_name(&r.agent_id).await else {
        return Ok(Some(ServerResponse::Error(ErrorResponse {
            id: Some(run_id),
            error: format!("unknown agent: {}", r.agent_id),
        })));
    };
    let agent = match agents.get_or_build(&name).await {
        Ok(a) => a,
        Err(e) => {
            return Ok(Some(ServerResponse::Error(ErrorResponse {
                id: Some(run_id),
                error: e.to_string(),
            })))
        }
    };

    request::try_append_initial_user_message(
        user_message_store.as_ref(),
        r.thread_id.as_deref(),
        &r.message,
    )
    .await;

    let session_id = r.session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let (tx, rx) = mpsc::channel(run_config.event_queue_capacity);
    let cancel = loom::CancellationToken::new();
    let run_handle = tokio::spawn(stream::run_agent_task(
        agent,
        session_id,
        r.message,
        tx,
        permissions.clone(),
        cancel.clone(),
    ));

    let mut sender = delivery::WebSocketRunSender(socket);
    delivery::handle_run_stream(run_id, rx, run_handle, cancel, &mut sender).await
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use loom::FinalMessage;
    use tokio::sync::mpsc;

    use super::delivery::{handle_run_stream, RunStreamSender};
    use super::request::try_append_initial_user_message;
    use crate::protocol::ServerResponse;

    /// Mock sender that can fail on first send or record sent responses.
    struct MockRunStreamSender {
        send_count: usize,
        fail_after: Option<usize>,
        last_run_end: Option<(String, String)>,
    }

    #[async_trait]
    impl RunStreamSender for MockRunStreamSender {
        async fn send_response(
            &mut self,
            response: &ServerResponse,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.send_count += 1;
            if let Some(n) = self.fail_after {
                if self.send_count >= n {
                    return Err("mock send failure".into());
                }
            }
            if let ServerResponse::RunEnd(r) = response {
                self.last_run_end = Some((r.id.clone(), r.content.clone()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn handle_run_stream_send_failure_cancels_and_returns_err() {
        let (tx, rx) = mpsc::channel::<serde_json::Value>(2);
        let cancel = loom::CancellationToken::new();
        let task_cancel = cancel.clone();
        let run_handle = tokio::spawn(async move {
            tokio::select! {
                _ = task_cancel.cancelled() => FinalMessage {
                    content: String::new(),
                    stop_reason: "cancelled",
                    error: Some("cancelled".to_string()),
                    truncated: false,
                },
                _ = tokio::time::sleep(std::time::Duration::from_secs(30)) => FinalMessage {
                    content: "never".to_string(),
                    stop_reason: "end_turn",
                    error: None,
                    truncated: false,
                },
            }
        });
        tx.send(serde_json::json!({"type": "token", "text": "hi"}))
            .await
            .unwrap();
        drop(tx);
        let mut sender = MockRunStreamSender {
            send_count: 0,
            fail_after: Some(1),
            last_run_end: None,
        };
        let out = handle_run_stream("run-1".to_string(), rx, run_handle, cancel, &mut sender).await;
        assert!(out.is_err());
        assert_eq!(out.unwrap_err().to_string(), "mock send failure");
    }

    #[tokio::test]
    async fn handle_run_stream_sends_run_end() {
        let (_tx, rx) = mpsc::channel::<serde_json::Value>(1);
        drop(_tx);
        let run_handle = tokio::spawn(async move {
            FinalMessage {
                content: "reply text".to_string(),
                stop_reason: "end_turn",
                error: None,
                truncated: false,
            }
        });
        let mut sender = MockRunStreamSender {
            send_count: 0,
            fail_after: None,
            last_run_end: None,
        };
        let cancel = loom::CancellationToken::new();
        let out = handle_run_stream("run-1".to_string(), rx, run_handle, cancel, &mut sender).await;
        assert!(out.is_ok());
        assert!(out.unwrap().is_none());
        assert_eq!(sender.send_count, 1);
        let (id, content) = sender.last_run_end.as_ref().unwrap();
        assert_eq!(id, "run-1");
        assert_eq!(content, "reply text");
    }

    #[tokio::test]
    async fn handle_run_stream_join_error_returns_err() {
        let (_tx, rx) = mpsc::channel::<serde_json::Value>(1);
        drop(_tx);
        let run_handle = tokio::spawn(async move {
            panic!("task panicked");
            #[allow(unreachable_code)]
            FinalMessage {
                content: String::new(),
                stop_reason: "end_turn",
                error: None,
                truncated: false,
            }
        });
        let mut sender = MockRunStreamSender {
            send_count: 0,
            fail_after: None,
            last_run_end: None,
        };
        let cancel = loom::CancellationToken::new();
        let out = handle_run_stream("run-1".to_string(), rx, run_handle, cancel, &mut sender).await;
        assert!(out.is_err());
        assert_eq!(sender.send_count, 0);
    }

    #[tokio::test]
    async fn try_append_initial_user_message_store_none_returns_false() {
        let got = try_append_initial_user_message(None, Some("t1"), "hi").await;
        assert!(!got);
    }

    #[tokio::test]
    async fn try_append_initial_user_message_thread_id_none_returns_false() {
        let store: std::sync::Arc<dyn loom::UserMessageStore> =
            std::sync::Arc::new(loom::NoOpUserMessageStore);
        let got = try_append_initial_user_message(Some(&store), None, "hi").await;
        assert!(!got);
    }

    #[tokio::test]
    async fn try_append_initial_user_message_both_some_returns_true() {
        let store: std::sync::Arc<dyn loom::UserMessageStore> =
            std::sync::Arc::new(loom::NoOpUserMessageStore);
        let got = try_append_initial_user_message(Some(&store), Some("t1"), "hello").await;
        assert!(got);
    }
}
