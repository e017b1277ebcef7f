//! Delivering the run stream to the client: a `RunStreamSender`
//! abstraction (mockable in tests) and `handle_run_stream`, which forwards
//! queued events then sends the terminal `RunEnd`/`Error`.

use async_trait::async_trait;
use axum::extract::ws::WebSocket;
use loom::{CancellationToken, FinalMessage};
use tokio::sync::mpsc;

use crate::protocol::{RunEndResponse, RunStreamEventResponse, ServerResponse};
use crate::response::send_response;

/// Abstraction for sending run-related server responses (`RunStreamEvent`,
/// `RunEnd`, `Error`), so [`handle_run_stream`] can be exercised without a
/// live WebSocket.
#[async_trait]
pub(crate) trait RunStreamSender: Send {
    /// Serializes and sends one response. Failure (e.g. connection closed)
    /// is returned so the caller can abort the run task and stop streaming.
    async fn send_response(
        &mut self,
        response: &ServerResponse,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Wraps the WebSocket in [`RunStreamSender`] so stream handling can be
/// tested with a mock.
pub(super) struct WebSocketRunSender<'a>(pub(super) &'a mut WebSocket);

#[async_trait]
impl RunStreamSender for WebSocketRunSender<'_> {
    async fn send_response(
        &mut self,
        response: &ServerResponse,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        send_response(self.0, response).await
    }
}

/// Consumes the event stream from the run task: for each event sends
/// `RunStreamEvent` via `sender`, then awaits the run task and sends
/// `RunEnd`/`Error`.
pub(super) async fn handle_run_stream<S>(
    run_id: String,
    mut rx: mpsc::Receiver<serde_json::Value>,
    run_handle: tokio::task::JoinHandle<FinalMessage>,
    cancel: CancellationToken,
    sender: &mut S,
) -> Result<Option<ServerResponse>, Box<dyn std::error::Error + Send + Sync>>
where
    S: RunStreamSender,
{
    let mut send_err: Option<Box<dyn std::error::Error + Send + Sync>> = None;
    while let Some(event) = rx.recv().await {
        if let Err(e) = sender
            .send_response(&ServerResponse::RunStreamEvent(RunStreamEventResponse {
                id: run_id.clone(),
                event,
            }))
            .await
        {
            send_err = Some(e);
            break;
        }
    }

    if let Some(e) = send_err {
        // Client disconnected or send failed; cancel the agent task and wait
        // for it to wind down to a terminal `FinalMessage` rather than
        // aborting it mid-call.
        cancel.cancel();
        let _ = run_handle.await;
        return Err(e);
    }

    let final_msg = run_handle
        .await
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)?;

    sender
        .send_response(&ServerResponse::RunEnd(RunEndResponse {
            id: run_id,
            content: final_msg.content,
            stop_reason: final_msg.stop_reason.to_string(),
            error: final_msg.error,
            truncated: final_msg.truncated,
        }))
        .await?;
    Ok(None)
}
