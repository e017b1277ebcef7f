//! Backend abstraction used by the `loom` CLI: run a turn and query tools
//! either in-process ([`LocalBackend`]) or over the WebSocket façade
//! ([`RemoteBackend`]).

pub mod auto_start;
mod local;
mod remote;

pub use local::LocalBackend;
pub use remote::RemoteBackend;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};

use crate::{RunError, RunOptions, ToolShowFormat};

/// Optional sink for JSON stream output (`--json`): when set, events are
/// forwarded immediately as they arrive instead of being accumulated.
pub type StreamOut = Option<Arc<Mutex<dyn FnMut(Value) + Send>>>;

/// Output of one `run`.
#[derive(Debug)]
pub enum RunOutput {
    Reply(String),
    Json { events: Vec<Value>, reply: String },
}

#[async_trait]
pub trait RunBackend: Send + Sync {
    /// Runs one agent turn.
    ///
    /// Streaming contract: with `stream_out = Some`, every event is
    /// forwarded immediately and the backend returns `RunOutput::Reply`;
    /// with `stream_out = None` and `opts.output_json`, events are
    /// accumulated and returned via `RunOutput::Json`.
    async fn run(&self, opts: &RunOptions, stream_out: StreamOut) -> Result<RunOutput, RunError>;
    async fn list_tools(&self, output_json: bool) -> Result<(), RunError>;
    async fn show_tool(&self, name: &str, format: ToolShowFormat) -> Result<(), RunError>;
}
