//! Runs one agent turn, converting each [`loom::Progress`] into a
//! [`stream_event::ProtocolEvent`] and forwarding the enveloped JSON onto a
//! bounded channel for [`super::delivery`] to stream over the WebSocket.

use std::sync::{Arc, Mutex};

use loom::{Agent, CancellationToken, FinalMessage, Progress, ProgressCallback};
use tokio::sync::mpsc;
use uuid::Uuid;

use stream_event::{to_json, EnvelopeState, ProtocolEvent};

use crate::permissions::PendingPermissions;

/// Converts one `Progress` into its wire event, synthesizing a permission
/// id and registering the turn loop's `respond` sender for
/// `PermissionRequested` so a later `PermissionResponse` can find it.
fn progress_to_event(progress: Progress, permissions: &PendingPermissions) -> ProtocolEvent {
    match progress {
        Progress::Token(text) => ProtocolEvent::Token { text },
        Progress::ToolStart { id, name } => ProtocolEvent::ToolStart { id, name },
        Progress::ToolEnd { id, name, ok } => ProtocolEvent::ToolEnd { id, name, ok },
        Progress::PermissionRequested(req) => {
            let id = Uuid::new_v4().to_string();
            permissions.insert(id.clone(), req.respond);
            ProtocolEvent::PermissionRequested {
                id,
                tool: req.tool_name,
                input: req.input,
            }
        }
    }
}

/// Runs `agent.run_stream` for one request, pushing every progress event
/// onto `tx` as it arrives. Drops events silently (with a warning) when the
/// channel is full, matching its bounded-queue backpressure
/// posture: a slow client falls behind rather than stalling the turn loop.
pub(super) async fn run_agent_task(
    agent: Arc<Agent>,
    session_id: String,
    message: String,
    tx: mpsc::Sender<serde_json::Value>,
    permissions: PendingPermissions,
    cancel: CancellationToken,
) -> FinalMessage {
    let state = Arc::new(Mutex::new(EnvelopeState::new(session_id.clone())));

    let callback: ProgressCallback = Arc::new(move |progress: Progress| {
        let event = progress_to_event(progress, &permissions);
        let value = {
            let mut guard = match state.lock() {
                Ok(g) => g,
                Err(e) => {
                    tracing::error!("envelope state lock failed (poisoned?): {}", e);
                    return;
                }
            };
            match to_json(&event, &mut guard) {
                Ok(v) => v,
                Err(e) => {
                    tracing::error!("event serialization failed: {}", e);
                    return;
                }
            }
        };
        if tx.try_send(value).is_err() {
            tracing::warn!("event queue full, dropping stream event (receiver likely disconnected)");
        }
    });

    agent.run_stream(&session_id, &message, Some(callback), cancel).await
}
