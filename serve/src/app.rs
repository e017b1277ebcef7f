//! Axum app: shared state, router, and the WebSocket upgrade handler.

use std::sync::{Arc, Mutex};

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::Response,
    routing::get,
    Router,
};
use tokio::sync::oneshot;

use crate::agents::AgentRuntime;
use crate::connection::handle_socket;

/// Queue and truncation knobs for one `Run`, overridable via env so an
/// operator can tune buffering without a rebuild.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RunConfig {
    pub event_queue_capacity: usize,
    pub append_queue_capacity: usize,
    pub display_max_len: usize,
}

const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 128;
const DEFAULT_APPEND_QUEUE_CAPACITY: usize = 64;
const DEFAULT_DISPLAY_MAX_LEN: usize = 2000;

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

pub(crate) fn run_config_from_env() -> RunConfig {
    RunConfig {
        event_queue_capacity: env_usize("LOOM_EVENT_QUEUE_CAPACITY", DEFAULT_EVENT_QUEUE_CAPACITY),
        append_queue_capacity: env_usize("LOOM_APPEND_QUEUE_CAPACITY", DEFAULT_APPEND_QUEUE_CAPACITY),
        display_max_len: env_usize("LOOM_DISPLAY_MAX_LEN", DEFAULT_DISPLAY_MAX_LEN),
    }
}

/// When set, the first WebSocket connection to close will send on this to
/// signal server exit (once mode, used by tests).
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) shutdown_tx: Arc<Mutex<Option<oneshot::Sender<()>>>>,
    pub(crate) agents: Arc<AgentRuntime>,
    pub(crate) user_message_store: Option<Arc<dyn loom::UserMessageStore>>,
    pub(crate) tls_status: TlsStatus,
    pub(crate) run_config: RunConfig,
}

/// TLS certificate provisioning is out of scope; this just
/// records whether the listener the caller bound is TLS-terminated, for
/// the `TlsStatus` RPC.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct TlsStatus {
    pub(crate) enabled: bool,
}

pub(crate) fn router(state: Arc<AppState>) -> Router {
    Router::new().route("/", get(ws_handler)).with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let shutdown_tx = state.shutdown_tx.lock().ok().and_then(|mut g| g.take());
    ws.on_upgrade(move |socket| handle_socket(socket, shutdown_tx, state))
}
