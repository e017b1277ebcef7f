//! Library surface of the `loom` CLI binary: the [`RunBackend`] abstraction
//! (local in-process vs. remote over WebSocket), the options a single
//! agent turn or tool query needs, and the local runtime bootstrap shared
//! by both the CLI and the one-shot `tool` subcommands.

pub mod backend;
mod runtime;
mod tool_cmd;

pub use backend::auto_start::ensure_server_or_spawn;
pub use backend::{LocalBackend, RemoteBackend, RunBackend, RunOutput, StreamOut};

use std::path::PathBuf;

/// Options for one `Run` (spec-level: agent id, session, thread, message)
/// shared by the local and remote backends.
#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    pub agent_id: String,
    pub session_id: Option<String>,
    pub thread_id: Option<String>,
    pub message: String,
    pub output_json: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("unknown agent: {0}")]
    UnknownAgent(String),
    #[error("tool not found: {0}")]
    ToolNotFound(String),
    #[error("remote error: {0}")]
    Remote(String),
    #[error("local error: {0}")]
    Local(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolShowFormat {
    Yaml,
    Json,
}

/// Reads `$LOOM_DATA_DIR` (default `./loom-data`), matching [`serve`]'s
/// on-disk layout so the CLI's local backend sees the same agents/tools.
pub(crate) fn data_dir() -> PathBuf {
    std::env::var("LOOM_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./loom-data"))
}
