//! Wire event types for one streamed `Run(agent_id, session_id, user_input)`
//! call. Each variant mirrors one `loom::agent::Progress` notification or
//! the terminal `loom::agent::FinalMessage`; the envelope (session_id,
//! event_id) is applied separately by [`crate::envelope`].

use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProtocolEvent {
    /// One incremental chunk of assistant text (`Progress::Token`).
    Token { text: String },
    /// A tool call was dispatched (`Progress::ToolStart`).
    ToolStart { id: String, name: String },
    /// A tool call finished, successfully or not (`Progress::ToolEnd`).
    ToolEnd { id: String, name: String, ok: bool },
    /// A `prompt`-mode permission decision is needed
    /// (`Progress::PermissionRequested`); the client replies out-of-band
    /// with the matching `id` before the agent's permission timeout elapses.
    PermissionRequested { id: String, tool: String, input: Value },
    /// Terminal event: the turn loop returned (`FinalMessage`).
    Final {
        content: String,
        stop_reason: String,
        error: Option<String>,
        truncated: bool,
    },
    /// Terminal event: the run failed before producing a final message.
    Error { message: String },
}

impl ProtocolEvent {
    /// Serializes this event to a JSON object (type + payload only; no envelope).
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
