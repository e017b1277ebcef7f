//! In-process backend: builds and runs the agent directly, no WebSocket
//! round trip.

use async_trait::async_trait;
use uuid::Uuid;

use crate::{runtime, tool_cmd, RunError, RunOptions, ToolShowFormat};

use super::{RunBackend, RunOutput, StreamOut};

pub struct LocalBackend;

#[async_trait]
impl RunBackend for LocalBackend {
    async fn run(&self, opts: &RunOptions, stream_out: StreamOut) -> Result<RunOutput, RunError> {
        let agent = runtime::build_agent(&opts.agent_id).await?;
        let session_id = opts.session_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        // Not yet wired to Ctrl-C; a fresh, never-cancelled token until the
        // CLI grows an interactive cancel path.
        let cancel = loom::CancellationToken::new();

        if let Some(sink) = stream_out {
            let callback: loom::ProgressCallback = std::sync::Arc::new(move |progress| {
                let value = progress_to_json(progress);
                if let Ok(mut f) = sink.lock() {
                    f(value);
                }
            });
            let final_msg = agent.run_stream(&session_id, &opts.message, Some(callback), cancel).await;
            return Ok(RunOutput::Reply(final_msg.content));
        }

        if opts.output_json {
            let events = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
            let collected = std::sync::Arc::clone(&events);
            let callback: loom::ProgressCallback = std::sync::Arc::new(move |progress| {
                let value = progress_to_json(progress);
                if let Ok(mut v) = collected.lock() {
                    v.push(value);
                }
            });
            let final_msg = agent.run_stream(&session_id, &opts.message, Some(callback), cancel).await;
            let events = events.lock().map(|v| v.clone()).unwrap_or_default();
            return Ok(RunOutput::Json { events, reply: final_msg.content });
        }

        let final_msg = agent.run_stream(&session_id, &opts.message, None, cancel).await;
        Ok(RunOutput::Reply(final_msg.content))
    }

    async fn list_tools(&self, output_json: bool) -> Result<(), RunError> {
        let tools = runtime::build_tool_registry()?;
        tool_cmd::print_tools_list(&tools.list(), output_json)
    }

    async fn show_tool(&self, name: &str, format: ToolShowFormat) -> Result<(), RunError> {
        let tools = runtime::build_tool_registry()?;
        let tool = tools.get(name).ok_or_else(|| RunError::ToolNotFound(name.to_string()))?;
        tool_cmd::print_tool_show(&tool.spec(), format)
    }
}

fn progress_to_json(progress: loom::Progress) -> serde_json::Value {
    match progress {
        loom::Progress::Token(text) => serde_json::json!({ "type": "token", "text": text }),
        loom::Progress::ToolStart { id, name } => {
            serde_json::json!({ "type": "tool_start", "id": id, "name": name })
        }
        loom::Progress::ToolEnd { id, name, ok } => {
            serde_json::json!({ "type": "tool_end", "id": id, "name": name, "ok": ok })
        }
        loom::Progress::PermissionRequested(req) => {
            // The CLI auto-allows: there is no interactive permission prompt
            // wired into this event sink, unlike `serve`'s WebSocket round trip.
            let _ = req.respond.send(true);
            serde_json::json!({ "type": "permission_requested", "tool": req.tool_name })
        }
    }
}
